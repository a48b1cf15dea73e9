//! The per-document job record and its persisted representation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::db::DatabaseError;
use crate::engine::adapter::naming;
use crate::engine::options::EngineKind;
use crate::error::JobError;
use crate::storage::StoredEntry;

// ─── Status ─────────────────────────────────────────────────────────────────

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(JobStatus::Uploaded),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ─── Settings ───────────────────────────────────────────────────────────────

/// Engine and extraction settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    pub engine: EngineKind,
    pub force_full_page_ocr: bool,
    pub extract_tables: bool,
    pub extract_images: bool,
    pub extract_text: bool,
}

impl JobSettings {
    /// Resolves `engine_name` and requests every artifact kind.
    ///
    /// Fails with [`JobError::UnsupportedEngine`] for unknown engine names.
    pub fn new(engine_name: &str, force_full_page_ocr: bool) -> Result<Self, JobError> {
        Ok(Self {
            engine: engine_name.parse()?,
            force_full_page_ocr,
            extract_tables: true,
            extract_images: true,
            extract_text: true,
        })
    }

    pub fn with_kinds(mut self, kinds: &[RequestedKind]) -> Self {
        self.extract_tables = kinds.contains(&RequestedKind::Tables);
        self.extract_images = kinds.contains(&RequestedKind::Images);
        self.extract_text = kinds.contains(&RequestedKind::Text);
        self
    }

    /// `force_true` or `force_false`, as used in run keys and text artifact names.
    pub fn force_label(&self) -> &'static str {
        force_label(self.force_full_page_ocr)
    }
}

pub fn force_label(force: bool) -> &'static str {
    if force {
        "force_true"
    } else {
        "force_false"
    }
}

/// Artifact kinds a caller can ask a run to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedKind {
    Tables,
    Images,
    Text,
}

impl RequestedKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tables" => Some(RequestedKind::Tables),
            "images" => Some(RequestedKind::Images),
            "text" => Some(RequestedKind::Text),
            _ => None,
        }
    }
}

// ─── Outcome ────────────────────────────────────────────────────────────────

/// Machine-usable reason a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    EngineFailure,
    StorageError,
    /// The process stopped while the run was in flight.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an error raised while executing a run.
    pub fn from_error(err: &JobError) -> Self {
        let kind = match err {
            JobError::Timeout(_) => FailureKind::Timeout,
            JobError::Storage(_) | JobError::Database(_) => FailureKind::StorageError,
            _ => FailureKind::EngineFailure,
        };
        Self::new(kind, err.to_string())
    }
}

/// Counts and artifact listing of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub run_key: String,
    pub namespace: String,
    pub table_count: u32,
    pub image_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_artifact: Option<String>,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub files: Vec<StoredEntry>,
}

// ─── Runs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Running,
    Completed,
    Failed,
}

/// One processing attempt and the namespace its artifacts live under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEntry {
    pub run_key: String,
    pub attempt: u32,
    pub settings: JobSettings,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl RunEntry {
    pub fn namespace(&self) -> String {
        run_namespace(&self.run_key)
    }
}

/// `{jobId}_{engine}_{force_true|force_false}_{attempt}`
pub fn run_key(job_id: &str, settings: &JobSettings, attempt: u32) -> String {
    format!(
        "{}_{}_{}_{}",
        job_id,
        settings.engine,
        settings.force_label(),
        attempt
    )
}

pub fn run_namespace(run_key: &str) -> String {
    format!("results/{}", run_key)
}

// ─── JobRecord ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTimestamps {
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_ended_at: Option<DateTime<Utc>>,
}

/// Durable state of one submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub original_name: String,
    pub input_key: String,
    pub input_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub status: JobStatus,
    /// Number of runs started so far.
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<JobSettings>,
    pub timestamps: JobTimestamps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
    #[serde(default)]
    pub runs: Vec<RunEntry>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        id: &str,
        original_name: &str,
        input_key: &str,
        input_size: u64,
        mime_type: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            original_name: original_name.to_string(),
            input_key: input_key.to_string(),
            input_size,
            mime_type,
            status: JobStatus::Uploaded,
            attempt: 0,
            settings: None,
            timestamps: JobTimestamps {
                uploaded_at: now,
                processing_started_at: None,
                processing_ended_at: None,
            },
            error: None,
            result_summary: None,
            runs: Vec::new(),
            updated_at: now,
        }
    }

    /// The most recently started run.
    pub fn current_run(&self) -> Option<&RunEntry> {
        self.runs.last()
    }

    pub fn current_run_mut(&mut self) -> Option<&mut RunEntry> {
        self.runs.last_mut()
    }

    pub fn find_run(&self, run_key: &str) -> Option<&RunEntry> {
        self.runs.iter().find(|r| r.run_key == run_key)
    }

    /// File stem of the original upload, used to name artifacts.
    pub fn doc_stem(&self) -> String {
        naming::doc_stem(&self.original_name)
    }

    pub fn to_row(&self) -> Result<JobRow, DatabaseError> {
        let corrupt = |e: serde_json::Error| DatabaseError::CorruptRecord {
            id: self.id.clone(),
            reason: e.to_string(),
        };

        Ok(JobRow {
            id: self.id.clone(),
            original_name: self.original_name.clone(),
            input_key: self.input_key.clone(),
            input_size: self.input_size,
            mime_type: self.mime_type.clone(),
            status: self.status.as_str().to_string(),
            attempt: self.attempt,
            settings: self
                .settings
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(corrupt)?,
            summary: self
                .result_summary
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(corrupt)?,
            error: self
                .error
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(corrupt)?,
            runs: serde_json::to_string(&self.runs).map_err(corrupt)?,
            uploaded_at: format_timestamp(self.timestamps.uploaded_at),
            processing_started_at: self.timestamps.processing_started_at.map(format_timestamp),
            processing_ended_at: self.timestamps.processing_ended_at.map(format_timestamp),
            updated_at: format_timestamp(self.updated_at),
        })
    }

    pub fn from_row(row: &JobRow) -> Result<Self, DatabaseError> {
        let corrupt = |reason: String| DatabaseError::CorruptRecord {
            id: row.id.clone(),
            reason,
        };
        let json = |field: &str, e: serde_json::Error| corrupt(format!("{}: {}", field, e));

        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", row.status)))?;

        let settings = row
            .settings
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| json("settings", e))?;
        let result_summary = row
            .summary
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| json("summary", e))?;
        let error = row
            .error
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| json("error", e))?;
        let runs = serde_json::from_str(&row.runs).map_err(|e| json("runs", e))?;

        let parse = |s: &str| parse_timestamp(s).map_err(|e| corrupt(e));

        Ok(Self {
            id: row.id.clone(),
            original_name: row.original_name.clone(),
            input_key: row.input_key.clone(),
            input_size: row.input_size,
            mime_type: row.mime_type.clone(),
            status,
            attempt: row.attempt,
            settings,
            timestamps: JobTimestamps {
                uploaded_at: parse(&row.uploaded_at)?,
                processing_started_at: row
                    .processing_started_at
                    .as_deref()
                    .map(parse)
                    .transpose()?,
                processing_ended_at: row
                    .processing_ended_at
                    .as_deref()
                    .map(parse)
                    .transpose()?,
            },
            error,
            result_summary,
            runs,
            updated_at: parse(&row.updated_at)?,
        })
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", s, e))
}
