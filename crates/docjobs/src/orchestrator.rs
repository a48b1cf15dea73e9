//! Front door of the crate: submit, run, status and retrieval of jobs.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::info_span;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_MAX_UPLOAD_BYTES};
use crate::db::Database;
use crate::engine::{Converter, EngineAdapter};
use crate::error::{JobError, Result, StorageError};
use crate::executor::BoundedExecutor;
use crate::job::{
    JobCounts, JobEvent, JobFailure, JobRecord, JobRegistry, JobSettings, JobStatus,
    ResultSummary, RunEntry, RunOutcome,
};
use crate::results::archive::build_zip;
use crate::results::{IndexedArtifact, NamedArtifact, ResultIndex, RetrieveKind, Retrieved, RunReport};
use crate::sanitize;
use crate::storage::{ArtifactStore, FileStorage};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Composes the artifact store, registry, engine adapter and executor.
///
/// Operations on different jobs never wait on each other. Two `run` calls
/// on the same job race in [`JobRegistry::begin_processing`]; the loser gets
/// [`JobError::AlreadyProcessing`] before any engine work starts.
pub struct JobOrchestrator {
    store: Arc<dyn ArtifactStore>,
    registry: Arc<JobRegistry>,
    adapter: Arc<EngineAdapter>,
    executor: BoundedExecutor,
    accepted_extensions: Vec<String>,
    max_upload_bytes: Option<u64>,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        registry: Arc<JobRegistry>,
        adapter: Arc<EngineAdapter>,
        executor: BoundedExecutor,
    ) -> Self {
        Self {
            store,
            registry,
            adapter,
            executor,
            accepted_extensions: vec!["pdf".to_string()],
            max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    /// Production constructor: opens the content directory and database
    /// named by `config` and routes every engine to `converter`.
    pub fn from_config(config: &Config, converter: Arc<dyn Converter>) -> Result<Self> {
        let data_path = config.data_path();
        std::fs::create_dir_all(&data_path).map_err(|e| StorageError::CreateDirectory {
            path: data_path.clone(),
            source: e,
        })?;

        let store: Arc<dyn ArtifactStore> = Arc::new(FileStorage::new(&data_path));
        let db = Database::open(&config.database_path())?;
        let registry = Arc::new(JobRegistry::open(db)?);
        let adapter = Arc::new(
            EngineAdapter::new(Arc::clone(&store), converter)
                .with_images_scale(config.images_scale),
        );

        log::info!(
            "Orchestrator ready: data in {}, deadline {}s",
            data_path.display(),
            config.deadline_secs
        );

        Ok(Self::new(
            store,
            registry,
            adapter,
            BoundedExecutor::new(config.deadline()),
        )
        .with_upload_policy(config.accepted_extensions.clone(), config.upload_limit()))
    }

    /// Replaces the accepted extensions and upload size limit (`None` = unlimited).
    pub fn with_upload_policy(mut self, extensions: Vec<String>, max_bytes: Option<u64>) -> Self {
        self.accepted_extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self.max_upload_bytes = max_bytes;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.executor = BoundedExecutor::new(deadline);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.executor.deadline()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    // ─── Submission ─────────────────────────────────────────────────────────

    /// Stores an uploaded document and registers it in `Uploaded`.
    ///
    /// Nothing is written when validation fails.
    pub fn submit(&self, bytes: &[u8], original_name: &str) -> Result<String> {
        let _span = info_span!(
            "job.submit",
            filename = %sanitize::span_name(original_name),
            size = bytes.len()
        )
        .entered();

        let extension = self.validate_upload(bytes, original_name)?;
        let mime_type = mime_guess::from_ext(&extension)
            .first()
            .map(|m| m.essence_str().to_string());

        let id = Uuid::new_v4().to_string();
        let input_key = format!("uploads/{}.{}", id, extension);
        let stored = self.store.put(&input_key, bytes)?;
        self.registry
            .create(&id, original_name.trim(), &input_key, stored.size, mime_type)?;

        log::info!(
            "Accepted upload {} as job {} ({} bytes)",
            sanitize::span_name(original_name),
            id,
            stored.size
        );
        Ok(id)
    }

    /// Returns the lowercase extension of an acceptable upload.
    fn validate_upload(&self, bytes: &[u8], original_name: &str) -> Result<String> {
        if bytes.is_empty() {
            return Err(JobError::InvalidInput("Uploaded file is empty".to_string()));
        }

        let name = original_name.trim();
        if name.is_empty() {
            return Err(JobError::InvalidInput("File name is required".to_string()));
        }

        let base = sanitize::base_name(name);
        if base.is_empty() {
            return Err(JobError::InvalidInput(format!(
                "'{}' does not name a file",
                name
            )));
        }

        let extension = Path::new(base)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                JobError::InvalidInput(format!("'{}' has no file extension", name))
            })?;

        if !self.accepted_extensions.iter().any(|e| *e == extension) {
            return Err(JobError::InvalidInput(format!(
                "Unsupported file type '.{}'. Accepted: {}",
                extension,
                self.accepted_extensions.join(", ")
            )));
        }

        if let Some(limit) = self.max_upload_bytes {
            if bytes.len() as u64 > limit {
                return Err(JobError::InvalidInput(format!(
                    "Upload of {} bytes exceeds the {} byte limit",
                    bytes.len(),
                    limit
                )));
            }
        }

        if extension == "pdf" && !bytes.starts_with(PDF_MAGIC) {
            return Err(JobError::InvalidInput(format!(
                "'{}' is not a PDF document",
                name
            )));
        }

        Ok(extension)
    }

    // ─── Processing ─────────────────────────────────────────────────────────

    /// Runs the engine for `id` and blocks until it finishes or the deadline
    /// passes.
    ///
    /// Every failure after the run has started is recorded on the job before
    /// it is returned.
    pub fn run(&self, id: &str, settings: JobSettings) -> Result<ResultSummary> {
        let _span = info_span!(
            "job.run",
            job_id = %id,
            engine = %settings.engine,
            force = settings.force_full_page_ocr
        )
        .entered();

        self.adapter.resolve(settings.engine.as_str())?;

        let record = self.registry.begin_processing(id, settings)?;
        let run = record
            .current_run()
            .cloned()
            .ok_or_else(|| JobError::NotFound(format!("current run of job '{}'", id)))?;

        log::info!("Started run {} of job {}", run.run_key, id);

        let outcome = self
            .execute_run(&record, &run)
            .and_then(|summary| self.registry.complete(id, summary.clone()).map(|_| summary));

        match outcome {
            Ok(summary) => {
                log::info!(
                    "Run {} completed in {} ms: {} table(s), {} image(s)",
                    run.run_key,
                    summary.processing_time_ms,
                    summary.table_count,
                    summary.image_count
                );
                Ok(summary)
            }
            Err(err) => {
                log::error!("Run {} failed: {}", run.run_key, err);
                if let Err(e) = self.registry.fail(id, JobFailure::from_error(&err)) {
                    log::error!("Failed to record failure of job {}: {}", id, e);
                }
                Err(err)
            }
        }
    }

    fn execute_run(&self, record: &JobRecord, run: &RunEntry) -> Result<ResultSummary> {
        let started = Instant::now();
        let namespace = run.namespace();

        let input = self.store.get(&record.input_key)?.ok_or_else(|| {
            JobError::Storage(StorageError::ReadFile {
                path: PathBuf::from(&record.input_key),
                source: io::Error::new(io::ErrorKind::NotFound, "stored input is missing"),
            })
        })?;

        let adapter = Arc::clone(&self.adapter);
        let settings = run.settings.clone();
        let input_name = record.original_name.clone();
        let engine_namespace = namespace.clone();
        let manifest = self.executor.execute(settings.engine.as_str(), move || {
            adapter.run(&input, &engine_namespace, &input_name, &settings)
        })?;

        let index = ResultIndex::build(self.store.as_ref(), &namespace)?;
        Ok(ResultSummary {
            run_key: run.run_key.clone(),
            namespace,
            table_count: manifest.table_count,
            image_count: manifest.image_count,
            text_artifact: manifest.text_artifact_name,
            processing_time_ms: started.elapsed().as_millis() as u64,
            files: index.summary().generated_files,
        })
    }

    /// Runs `id` on a dedicated thread.
    pub fn spawn_run(
        self: &Arc<Self>,
        id: &str,
        settings: JobSettings,
    ) -> Result<JoinHandle<Result<ResultSummary>>> {
        let orchestrator = Arc::clone(self);
        let job_id = id.to_string();
        thread::Builder::new()
            .name(format!("run-{}", id))
            .spawn(move || orchestrator.run(&job_id, settings))
            .map_err(|e| JobError::EngineFailure(format!("Failed to spawn run thread: {}", e)))
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub fn status(&self, id: &str) -> Result<JobRecord> {
        self.registry.get(id)
    }

    /// All jobs, newest upload first.
    pub fn list_jobs(&self) -> Vec<JobRecord> {
        self.registry.list()
    }

    pub fn counts(&self) -> JobCounts {
        self.registry.counts()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.registry.subscribe()
    }

    /// Reads the artifacts of the job's current run.
    ///
    /// Fails with [`JobError::NotProcessed`] unless the job is `Completed`.
    pub fn retrieve(&self, id: &str, kind: RetrieveKind) -> Result<Retrieved> {
        let _span = info_span!("job.retrieve", job_id = %id, kind = %kind).entered();

        let record = self.completed(id)?;
        let run = record
            .current_run()
            .ok_or_else(|| JobError::NotFound(format!("current run of job '{}'", id)))?;
        self.retrieve_from(&record, run, kind)
    }

    /// Reads the artifacts of an earlier run, addressed by its run key.
    pub fn retrieve_run(&self, id: &str, run_key: &str, kind: RetrieveKind) -> Result<Retrieved> {
        let _span = info_span!("job.retrieve_run", job_id = %id, run_key = %run_key, kind = %kind)
            .entered();

        let record = self.registry.get(id)?;
        let run = record
            .find_run(run_key)
            .ok_or_else(|| JobError::NotFound(format!("run '{}' of job '{}'", run_key, id)))?;

        match run.outcome {
            RunOutcome::Completed => self.retrieve_from(&record, run, kind),
            RunOutcome::Running => Err(JobError::NotProcessed {
                id: id.to_string(),
                status: JobStatus::Processing,
            }),
            RunOutcome::Failed => Err(JobError::NotProcessed {
                id: id.to_string(),
                status: JobStatus::Failed,
            }),
        }
    }

    /// One artifact of the current run, by file name.
    pub fn download(&self, id: &str, filename: &str) -> Result<NamedArtifact> {
        let name = sanitize::artifact_file_name(filename)
            .ok_or_else(|| JobError::InvalidInput(format!("Invalid artifact name '{}'", filename)))?;

        let record = self.completed(id)?;
        let run = record
            .current_run()
            .ok_or_else(|| JobError::NotFound(format!("current run of job '{}'", id)))?;
        let index = ResultIndex::build(self.store.as_ref(), &run.namespace())?;
        let artifact = index
            .find(name)
            .ok_or_else(|| JobError::NotFound(format!("artifact '{}' of job '{}'", name, id)))?;
        self.read(&index, artifact)
    }

    fn completed(&self, id: &str) -> Result<JobRecord> {
        let record = self.registry.get(id)?;
        if record.status != JobStatus::Completed {
            return Err(JobError::NotProcessed {
                id: id.to_string(),
                status: record.status,
            });
        }
        Ok(record)
    }

    fn retrieve_from(&self, record: &JobRecord, run: &RunEntry, kind: RetrieveKind) -> Result<Retrieved> {
        let index = ResultIndex::build(self.store.as_ref(), &run.namespace())?;

        match kind {
            RetrieveKind::Summary => {
                let summary = index.summary();
                Ok(Retrieved::Summary(RunReport {
                    job_id: record.id.clone(),
                    original_name: record.original_name.clone(),
                    status: record.status,
                    uploaded_at: record.timestamps.uploaded_at,
                    run_key: run.run_key.clone(),
                    settings: run.settings.clone(),
                    processing_time_ms: run
                        .summary
                        .as_ref()
                        .map(|s| s.processing_time_ms)
                        .unwrap_or_default(),
                    table_count: summary.table_count,
                    image_count: summary.image_count,
                    text_files: summary.text_files,
                    generated_files: summary.generated_files,
                }))
            }
            RetrieveKind::Text => {
                let artifact = index
                    .text(run.settings.engine.as_str(), run.settings.force_label())
                    .ok_or_else(|| {
                        JobError::NotFound(format!("text output of run '{}'", run.run_key))
                    })?;
                Ok(Retrieved::Text(self.read(&index, artifact)?))
            }
            RetrieveKind::Tables => {
                let files = self.read_all(&index, index.tables(), "tables", run)?;
                Ok(Retrieved::Files(files))
            }
            RetrieveKind::Images => {
                let files = self.read_all(&index, index.images(), "images", run)?;
                Ok(Retrieved::Files(files))
            }
            RetrieveKind::All => {
                let files = self.read_all(&index, index.all(), "artifacts", run)?;
                Ok(Retrieved::Files(files))
            }
            RetrieveKind::Archive => {
                let files = self.read_all(&index, index.all(), "artifacts", run)?;
                let bytes = build_zip(&files)?;
                Ok(Retrieved::Archive(NamedArtifact::new(
                    &format!("{}.zip", run.run_key),
                    bytes,
                )))
            }
        }
    }

    fn read_all(
        &self,
        index: &ResultIndex,
        artifacts: Vec<&IndexedArtifact>,
        what: &str,
        run: &RunEntry,
    ) -> Result<Vec<NamedArtifact>> {
        if artifacts.is_empty() {
            return Err(JobError::NotFound(format!("{} of run '{}'", what, run.run_key)));
        }
        artifacts.into_iter().map(|a| self.read(index, a)).collect()
    }

    fn read(&self, index: &ResultIndex, artifact: &IndexedArtifact) -> Result<NamedArtifact> {
        let bytes = self
            .store
            .get(&index.key(&artifact.name))?
            .ok_or_else(|| JobError::NotFound(format!("artifact '{}'", artifact.name)))?;
        Ok(NamedArtifact::new(&artifact.name, bytes))
    }

    // ─── Housekeeping ───────────────────────────────────────────────────────

    /// Deletes the namespaces of every run except the current one.
    ///
    /// Run history and the job record are kept. Returns how many namespaces
    /// were removed.
    pub fn prune_runs(&self, id: &str) -> Result<usize> {
        let _span = info_span!("job.prune", job_id = %id).entered();

        let record = self.registry.get(id)?;
        let current = record.current_run().map(|r| r.run_key.clone());

        let mut removed = 0;
        for run in &record.runs {
            if Some(&run.run_key) == current.as_ref() {
                continue;
            }
            if self.store.remove_namespace(&run.namespace())? {
                log::debug!("Removed namespace of run {}", run.run_key);
                removed += 1;
            }
        }

        log::info!("Pruned {} old run namespace(s) of job {}", removed, id);
        Ok(removed)
    }
}
