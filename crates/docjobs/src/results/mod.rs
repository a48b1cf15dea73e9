//! Retrieval of run artifacts by kind.

pub mod archive;
pub mod index;

pub use index::{classify, ArtifactKind, IndexSummary, IndexedArtifact, ResultIndex};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::JobError;
use crate::job::record::{JobSettings, JobStatus};
use crate::storage::StoredEntry;

/// What a caller can ask `retrieve` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveKind {
    Summary,
    Text,
    Tables,
    Images,
    All,
    /// Every artifact packed into one zip.
    Archive,
}

impl RetrieveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieveKind::Summary => "summary",
            RetrieveKind::Text => "text",
            RetrieveKind::Tables => "tables",
            RetrieveKind::Images => "images",
            RetrieveKind::All => "all",
            RetrieveKind::Archive => "archive",
        }
    }
}

impl fmt::Display for RetrieveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrieveKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(RetrieveKind::Summary),
            "text" => Ok(RetrieveKind::Text),
            "tables" => Ok(RetrieveKind::Tables),
            "images" => Ok(RetrieveKind::Images),
            "all" => Ok(RetrieveKind::All),
            "archive" | "zip" => Ok(RetrieveKind::Archive),
            other => Err(JobError::InvalidInput(format!(
                "Invalid kind '{}'. Use: summary, text, tables, images, all or archive",
                other
            ))),
        }
    }
}

/// One artifact's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArtifact {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl NamedArtifact {
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            media_type: media_type(name),
            bytes,
        }
    }
}

fn media_type(name: &str) -> String {
    if name.ends_with(".md") {
        // mime_guess maps .md to text/x-markdown
        return "text/markdown".to_string();
    }
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// The `summary` view of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub job_id: String,
    pub original_name: String,
    pub status: JobStatus,
    pub uploaded_at: DateTime<Utc>,
    pub run_key: String,
    pub settings: JobSettings,
    pub processing_time_ms: u64,
    pub table_count: u32,
    pub image_count: u32,
    pub text_files: Vec<String>,
    pub generated_files: Vec<StoredEntry>,
}

#[derive(Debug, Clone)]
pub enum Retrieved {
    Summary(RunReport),
    Text(NamedArtifact),
    /// Tables, images or every artifact, in index order.
    Files(Vec<NamedArtifact>),
    Archive(NamedArtifact),
}

impl Retrieved {
    pub fn kind(&self) -> &'static str {
        match self {
            Retrieved::Summary(_) => "summary",
            Retrieved::Text(_) => "text",
            Retrieved::Files(_) => "files",
            Retrieved::Archive(_) => "archive",
        }
    }
}
