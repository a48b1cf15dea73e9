use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::options::{EngineKind, DEFAULT_IMAGES_SCALE};

pub const DEFAULT_DEADLINE_SECS: u64 = 600;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_engine")]
    pub default_engine: EngineKind,
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_images_scale")]
    pub images_scale: f32,
}

fn default_data_directory() -> String {
    crate::db::default_data_directory()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "./docjobs-data".to_string())
}

fn default_deadline_secs() -> u64 {
    DEFAULT_DEADLINE_SECS
}

fn default_engine() -> EngineKind {
    EngineKind::RapidOcr
}

fn default_accepted_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_images_scale() -> f32 {
    DEFAULT_IMAGES_SCALE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: default_data_directory(),
            database_path: None,
            deadline_secs: DEFAULT_DEADLINE_SECS,
            default_engine: default_engine(),
            accepted_extensions: default_accepted_extensions(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            images_scale: DEFAULT_IMAGES_SCALE,
        }
    }
}

impl Config {
    /// A default config rooted at `data_directory`.
    pub fn with_data_directory(data_directory: impl Into<String>) -> Self {
        Self {
            data_directory: data_directory.into(),
            ..Self::default()
        }
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_directory)
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => self.data_path().join("docjobs.db"),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// `None` when uploads are unlimited.
    pub fn upload_limit(&self) -> Option<u64> {
        (self.max_upload_bytes > 0).then_some(self.max_upload_bytes)
    }
}
