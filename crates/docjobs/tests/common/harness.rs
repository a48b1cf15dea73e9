//! Isolated orchestrator environments for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docjobs::db::Database;
use docjobs::engine::{Converter, EngineAdapter};
use docjobs::storage::{ArtifactStore, FileStorage};
use docjobs::{BoundedExecutor, Config, JobOrchestrator, JobRegistry};

/// A `%PDF-` payload padded to exactly `size` bytes.
pub fn pdf_bytes(size: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(size.max(bytes.len()), b'%');
    bytes
}

/// Orchestrator over a temp content directory and an in-memory database.
pub struct TestHarness {
    temp_dir: TempDir,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl TestHarness {
    /// Five-second deadline.
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self::with_deadline(converter, Duration::from_secs(5))
    }

    pub fn with_deadline(converter: Arc<dyn Converter>, deadline: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn ArtifactStore> = Arc::new(FileStorage::new(temp_dir.path()));
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let registry = Arc::new(JobRegistry::open(db).expect("Failed to open registry"));
        let adapter = Arc::new(EngineAdapter::new(Arc::clone(&store), converter));
        let orchestrator = JobOrchestrator::new(
            store,
            registry,
            adapter,
            BoundedExecutor::new(deadline),
        );

        Self {
            temp_dir,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn data_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Submits a padded PDF payload under `name`.
    pub fn submit_pdf(&self, name: &str, size: usize) -> String {
        self.orchestrator
            .submit(&pdf_bytes(size), name)
            .expect("Failed to submit document")
    }
}

/// Opens an orchestrator the way the binary does: file-backed database under
/// `data_dir`. Reopening the same directory simulates a process restart.
pub fn open_persistent(data_dir: &Path, converter: Arc<dyn Converter>) -> JobOrchestrator {
    let config = Config::with_data_directory(data_dir.to_string_lossy().to_string());
    JobOrchestrator::from_config(&config, converter).expect("Failed to open orchestrator")
}
