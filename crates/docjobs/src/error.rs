use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::job::record::JobStatus;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job '{id}' has not been processed yet (status: {status})")]
    NotProcessed { id: String, status: JobStatus },

    #[error("Job '{0}' is already processing")]
    AlreadyProcessing(String),

    #[error("Cannot {action} job '{id}' while it is {status}")]
    InvalidTransition {
        id: String,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Engine timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Machine-usable classification of a [`JobError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    NotProcessed,
    AlreadyProcessing,
    InvalidTransition,
    UnsupportedEngine,
    Timeout,
    EngineFailure,
    Storage,
}

/// How a transport should answer a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    BadRequest,
    NotFound,
    Conflict,
    ServerError,
}

impl ErrorKind {
    pub fn response_class(self) -> ResponseClass {
        match self {
            ErrorKind::InvalidInput
            | ErrorKind::NotProcessed
            | ErrorKind::InvalidTransition
            | ErrorKind::UnsupportedEngine => ResponseClass::BadRequest,
            ErrorKind::NotFound => ResponseClass::NotFound,
            ErrorKind::AlreadyProcessing => ResponseClass::Conflict,
            ErrorKind::Timeout | ErrorKind::EngineFailure | ErrorKind::Storage => {
                ResponseClass::ServerError
            }
        }
    }

    /// Whether calling again later (possibly with other settings) can succeed
    /// without the caller changing its input.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::AlreadyProcessing | ErrorKind::Timeout | ErrorKind::EngineFailure
        )
    }
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidInput(_) => ErrorKind::InvalidInput,
            JobError::NotFound(_) => ErrorKind::NotFound,
            JobError::NotProcessed { .. } => ErrorKind::NotProcessed,
            JobError::AlreadyProcessing(_) => ErrorKind::AlreadyProcessing,
            JobError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            JobError::UnsupportedEngine(_) => ErrorKind::UnsupportedEngine,
            JobError::Timeout(_) => ErrorKind::Timeout,
            JobError::EngineFailure(_) => ErrorKind::EngineFailure,
            JobError::Storage(_) | JobError::Database(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive: {0}")]
    Archive(String),
}

/// Raised by a conversion engine.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load document: {0}")]
    Load(String),

    #[error("{0}")]
    Engine(String),
}

impl From<ConversionError> for JobError {
    fn from(err: ConversionError) -> Self {
        JobError::EngineFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
