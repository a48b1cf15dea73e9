pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod job;
pub mod orchestrator;
pub mod results;
pub mod sanitize;
pub mod storage;

pub use config::{load_config, Config};
pub use engine::{Converter, Document, EngineAdapter, EngineKind, PdfTextConverter};
pub use error::{ConfigError, ConversionError, ErrorKind, JobError, ResponseClass, Result, StorageError};
pub use executor::BoundedExecutor;
pub use job::{JobRecord, JobRegistry, JobSettings, JobStatus, ResultSummary};
pub use orchestrator::JobOrchestrator;
pub use results::{ResultIndex, RetrieveKind, Retrieved};
pub use storage::{ArtifactStore, FileStorage};
