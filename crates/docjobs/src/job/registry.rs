//! Job registry: the durable job state machine with an in-memory cache.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::{job_repo, Database};
use crate::error::{JobError, Result};

use super::events::{JobEvent, JobEventBroadcaster};
use super::record::{
    run_key, FailureKind, JobFailure, JobRecord, JobSettings, JobStatus, ResultSummary, RunEntry,
    RunOutcome,
};

/// Per-status totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub uploaded: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.uploaded + self.processing + self.completed + self.failed
    }
}

/// Owns every [`JobRecord`].
///
/// The SQLite store is authoritative; the cache is rebuilt from it on
/// [`open`](Self::open). Each transition holds the cache write lock while it
/// compare-and-sets the `status` column, so two callers racing on the same
/// job see exactly one winner.
pub struct JobRegistry {
    db: Database,
    cache: RwLock<HashMap<String, JobRecord>>,
    events: JobEventBroadcaster,
}

impl JobRegistry {
    /// Loads all durable records. Records left in `processing` by a previous
    /// process are failed with [`FailureKind::Interrupted`].
    ///
    /// Fails with [`DatabaseError::CorruptRecord`](crate::db::DatabaseError::CorruptRecord)
    /// if any stored row cannot be read back.
    pub fn open(db: Database) -> Result<Self> {
        let rows = job_repo::list_all(&db)?;
        let mut cache = HashMap::with_capacity(rows.len());
        let mut interrupted = 0usize;

        for row in &rows {
            let mut record = JobRecord::from_row(row).inspect_err(|e| {
                log::error!("Refusing to open job store: {}", e);
            })?;

            if record.status == JobStatus::Processing {
                finish_run(
                    &mut record,
                    RunOutcome::Failed,
                    None,
                    Some(JobFailure::new(
                        FailureKind::Interrupted,
                        "Processing was interrupted by a restart",
                    )),
                );
                job_repo::update_if_status(
                    &db,
                    &record.to_row()?,
                    JobStatus::Processing.as_str(),
                )?;
                interrupted += 1;
            }

            cache.insert(record.id.clone(), record);
        }

        log::info!(
            "Loaded {} job(s) from store ({} interrupted run(s) marked failed)",
            cache.len(),
            interrupted
        );

        Ok(Self {
            db,
            cache: RwLock::new(cache),
            events: JobEventBroadcaster::default(),
        })
    }

    /// Registers a freshly uploaded document in `Uploaded`.
    pub fn create(
        &self,
        id: &str,
        original_name: &str,
        input_key: &str,
        input_size: u64,
        mime_type: Option<String>,
    ) -> Result<JobRecord> {
        let mut cache = self.write_cache();
        if let Some(existing) = cache.get(id) {
            return Err(JobError::InvalidTransition {
                id: id.to_string(),
                status: existing.status,
                action: "create",
            });
        }

        let record = JobRecord::new(id, original_name, input_key, input_size, mime_type);
        job_repo::insert(&self.db, &record.to_row()?)?;
        cache.insert(id.to_string(), record.clone());
        drop(cache);

        self.events
            .send(JobEvent::from_record(&record, "Document uploaded"));
        Ok(record)
    }

    /// Starts a new run. Legal from `Uploaded`, `Completed` and `Failed`.
    ///
    /// Returns the updated record; its last [`RunEntry`] names the fresh
    /// namespace for this run.
    pub fn begin_processing(&self, id: &str, settings: JobSettings) -> Result<JobRecord> {
        self.transition(id, "begin processing", "Processing started", |current| {
            if current.status == JobStatus::Processing {
                return Err(JobError::AlreadyProcessing(id.to_string()));
            }

            let now = Utc::now();
            let attempt = current.attempt + 1;
            let mut next = current.clone();
            next.status = JobStatus::Processing;
            next.attempt = attempt;
            next.settings = Some(settings.clone());
            next.error = None;
            next.result_summary = None;
            next.timestamps.processing_started_at = Some(now);
            next.timestamps.processing_ended_at = None;
            next.runs.push(RunEntry {
                run_key: run_key(id, &settings, attempt),
                attempt,
                settings,
                started_at: now,
                ended_at: None,
                outcome: RunOutcome::Running,
                summary: None,
                error: None,
            });
            Ok(next)
        })
    }

    /// Marks the current run completed. Legal only from `Processing`.
    pub fn complete(&self, id: &str, summary: ResultSummary) -> Result<JobRecord> {
        self.transition(id, "complete", "Processing completed", |current| {
            require_processing(current, "complete")?;
            let current_key = current.current_run().map(|r| r.run_key.as_str());
            if current_key != Some(summary.run_key.as_str()) {
                return Err(JobError::InvalidTransition {
                    id: id.to_string(),
                    status: current.status,
                    action: "complete a stale run of",
                });
            }

            let mut next = current.clone();
            finish_run(&mut next, RunOutcome::Completed, Some(summary), None);
            Ok(next)
        })
    }

    /// Marks the current run failed. Legal only from `Processing`.
    pub fn fail(&self, id: &str, failure: JobFailure) -> Result<JobRecord> {
        self.transition(id, "fail", "Processing failed", |current| {
            require_processing(current, "fail")?;
            let mut next = current.clone();
            finish_run(&mut next, RunOutcome::Failed, None, Some(failure));
            Ok(next)
        })
    }

    pub fn get(&self, id: &str) -> Result<JobRecord> {
        self.read_cache()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// All records, newest upload first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.read_cache().values().cloned().collect();
        jobs.sort_by(|a, b| {
            b.timestamps
                .uploaded_at
                .cmp(&a.timestamps.uploaded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.read_cache().values() {
            match job.status {
                JobStatus::Uploaded => counts.uploaded += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn transition<F>(
        &self,
        id: &str,
        action: &'static str,
        message: &str,
        apply: F,
    ) -> Result<JobRecord>
    where
        F: FnOnce(&JobRecord) -> Result<JobRecord>,
    {
        let mut cache = self.write_cache();
        let current = cache.get(id).ok_or_else(|| not_found(id))?;
        let expected = current.status;

        let mut next = apply(current)?;
        next.updated_at = Utc::now();

        if !job_repo::update_if_status(&self.db, &next.to_row()?, expected.as_str())? {
            // Another writer moved the durable row; resync and report its state.
            let actual = match job_repo::find_by_id(&self.db, id)? {
                Some(row) => JobRecord::from_row(&row)?,
                None => return Err(not_found(id)),
            };
            let status = actual.status;
            cache.insert(id.to_string(), actual);
            log::warn!(
                "Job {} changed underneath registry (expected {}, found {})",
                id,
                expected,
                status
            );
            return Err(if status == JobStatus::Processing && action == "begin processing" {
                JobError::AlreadyProcessing(id.to_string())
            } else {
                JobError::InvalidTransition {
                    id: id.to_string(),
                    status,
                    action,
                }
            });
        }

        cache.insert(id.to_string(), next.clone());
        drop(cache);

        log::debug!("Job {}: {} -> {}", id, expected, next.status);
        self.events.send(JobEvent::from_record(&next, message));
        Ok(next)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn not_found(id: &str) -> JobError {
    JobError::NotFound(format!("job '{}'", id))
}

fn require_processing(record: &JobRecord, action: &'static str) -> Result<()> {
    if record.status == JobStatus::Processing {
        Ok(())
    } else {
        Err(JobError::InvalidTransition {
            id: record.id.clone(),
            status: record.status,
            action,
        })
    }
}

/// Moves a `Processing` record into its terminal state and closes its
/// current run entry.
fn finish_run(
    record: &mut JobRecord,
    outcome: RunOutcome,
    summary: Option<ResultSummary>,
    error: Option<JobFailure>,
) {
    let now = Utc::now();
    record.status = match outcome {
        RunOutcome::Completed => JobStatus::Completed,
        RunOutcome::Failed | RunOutcome::Running => JobStatus::Failed,
    };
    record.timestamps.processing_ended_at = Some(now);
    record.result_summary = summary.clone();
    record.error = error.clone();
    record.updated_at = now;

    if let Some(run) = record.current_run_mut() {
        run.ended_at = Some(now);
        run.outcome = outcome;
        run.summary = summary;
        run.error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn registry() -> JobRegistry {
        JobRegistry::open(Database::open_in_memory().unwrap()).unwrap()
    }

    fn settings() -> JobSettings {
        JobSettings::new("rapidocr", true).unwrap()
    }

    fn summary_for(record: &JobRecord) -> ResultSummary {
        let run = record.current_run().unwrap();
        ResultSummary {
            run_key: run.run_key.clone(),
            namespace: run.namespace(),
            table_count: 3,
            image_count: 0,
            text_artifact: Some("report_full_text_rapidocr_force_true.md".to_string()),
            processing_time_ms: 12,
            files: vec![],
        }
    }

    #[test]
    fn test_create_starts_uploaded() {
        let reg = registry();
        let record = reg
            .create("j1", "report.pdf", "uploads/j1.pdf", 2400, None)
            .unwrap();
        assert_eq!(record.status, JobStatus::Uploaded);
        assert_eq!(reg.get("j1").unwrap().input_size, 2400);
    }

    #[test]
    fn test_create_duplicate_id_fails() {
        let reg = registry();
        reg.create("j1", "a.pdf", "uploads/j1.pdf", 1, None).unwrap();
        let err = reg
            .create("j1", "b.pdf", "uploads/j1.pdf", 1, None)
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { action: "create", .. }));
    }

    #[test]
    fn test_full_lifecycle() {
        let reg = registry();
        reg.create("j1", "report.pdf", "uploads/j1.pdf", 2400, None)
            .unwrap();

        let processing = reg.begin_processing("j1", settings()).unwrap();
        assert_eq!(processing.status, JobStatus::Processing);
        assert_eq!(processing.attempt, 1);
        assert!(processing.timestamps.processing_started_at.is_some());
        assert_eq!(
            processing.current_run().unwrap().run_key,
            "j1_rapidocr_force_true_1"
        );

        let done = reg.complete("j1", summary_for(&processing)).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.error.is_none());
        assert_eq!(done.result_summary.as_ref().unwrap().table_count, 3);
        assert!(done.timestamps.processing_ended_at >= done.timestamps.processing_started_at);
        assert_eq!(done.current_run().unwrap().outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_begin_while_processing_is_already_processing() {
        let reg = registry();
        reg.create("j1", "a.pdf", "uploads/j1.pdf", 1, None).unwrap();
        reg.begin_processing("j1", settings()).unwrap();

        let err = reg.begin_processing("j1", settings()).unwrap_err();
        assert!(matches!(err, JobError::AlreadyProcessing(_)));
        assert_eq!(reg.get("j1").unwrap().attempt, 1);
    }

    #[test]
    fn test_complete_and_fail_require_processing() {
        let reg = registry();
        reg.create("j1", "a.pdf", "uploads/j1.pdf", 1, None).unwrap();

        let err = reg
            .fail("j1", JobFailure::new(FailureKind::EngineFailure, "x"))
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                status: JobStatus::Uploaded,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let reg = registry();
        assert!(matches!(reg.get("nope"), Err(JobError::NotFound(_))));
        assert!(matches!(
            reg.begin_processing("nope", settings()),
            Err(JobError::NotFound(_))
        ));
    }

    #[test]
    fn test_rerun_after_failure_clears_error_and_keeps_identity() {
        let reg = registry();
        let created = reg
            .create("j1", "a.pdf", "uploads/j1.pdf", 1, None)
            .unwrap();
        reg.begin_processing("j1", settings()).unwrap();
        reg.fail("j1", JobFailure::new(FailureKind::Timeout, "slow"))
            .unwrap();

        let tesseract = JobSettings::new("tesseract", false).unwrap();
        let rerun = reg.begin_processing("j1", tesseract.clone()).unwrap();
        assert_eq!(rerun.status, JobStatus::Processing);
        assert!(rerun.error.is_none());
        assert_eq!(rerun.settings, Some(tesseract));
        assert_eq!(rerun.input_key, created.input_key);
        assert_eq!(rerun.timestamps.uploaded_at, created.timestamps.uploaded_at);
        assert_eq!(rerun.runs.len(), 2);
        assert_eq!(rerun.runs[0].outcome, RunOutcome::Failed);
        assert_eq!(rerun.runs[1].run_key, "j1_tesseract_force_false_2");
    }

    #[test]
    fn test_complete_rejects_stale_run_key() {
        let reg = registry();
        reg.create("j1", "a.pdf", "uploads/j1.pdf", 1, None).unwrap();
        let first = reg.begin_processing("j1", settings()).unwrap();
        let stale = summary_for(&first);
        reg.fail("j1", JobFailure::new(FailureKind::Timeout, "slow"))
            .unwrap();
        reg.begin_processing("j1", settings()).unwrap();

        assert!(matches!(
            reg.complete("j1", stale),
            Err(JobError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_concurrent_begin_has_one_winner() {
        let reg = Arc::new(registry());
        reg.create("j1", "a.pdf", "uploads/j1.pdf", 1, None).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    reg.begin_processing("j1", settings())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(JobError::AlreadyProcessing(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(losers, 7);
    }

    #[test]
    fn test_reopen_rebuilds_cache_and_fails_interrupted() {
        let db = Database::open_in_memory().unwrap();
        {
            let reg = JobRegistry::open(db.clone()).unwrap();
            reg.create("done", "a.pdf", "uploads/done.pdf", 1, None)
                .unwrap();
            reg.create("stuck", "b.pdf", "uploads/stuck.pdf", 1, None)
                .unwrap();
            reg.begin_processing("stuck", settings()).unwrap();
        }

        let reg = JobRegistry::open(db).unwrap();
        assert_eq!(reg.get("done").unwrap().status, JobStatus::Uploaded);

        let stuck = reg.get("stuck").unwrap();
        assert_eq!(stuck.status, JobStatus::Failed);
        assert_eq!(stuck.error.unwrap().kind, FailureKind::Interrupted);
        assert!(stuck.timestamps.processing_ended_at.is_some());

        // The interrupted job can be re-run.
        assert!(reg.begin_processing("stuck", settings()).is_ok());
    }

    #[test]
    fn test_reopen_with_unreadable_row_fails() {
        let db = Database::open_in_memory().unwrap();
        {
            let reg = JobRegistry::open(db.clone()).unwrap();
            reg.create("ok", "a.pdf", "uploads/ok.pdf", 1, None).unwrap();
            reg.create("bad", "b.pdf", "uploads/bad.pdf", 1, None).unwrap();
        }
        db.with_conn(|conn| {
            conn.execute("UPDATE jobs SET status = 'archived' WHERE id = 'bad'", [])?;
            Ok(())
        })
        .unwrap();

        let err = JobRegistry::open(db).err().unwrap();
        assert!(matches!(
            err,
            JobError::Database(crate::db::DatabaseError::CorruptRecord { ref id, .. }) if id == "bad"
        ));
    }

    #[test]
    fn test_counts_and_list() {
        let reg = registry();
        reg.create("a", "a.pdf", "uploads/a.pdf", 1, None).unwrap();
        reg.create("b", "b.pdf", "uploads/b.pdf", 1, None).unwrap();
        reg.begin_processing("b", settings()).unwrap();

        let counts = reg.counts();
        assert_eq!(counts.uploaded, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total(), 2);
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn test_transitions_are_broadcast() {
        let reg = registry();
        let mut rx = reg.subscribe();

        reg.create("j1", "a.pdf", "uploads/j1.pdf", 1, None).unwrap();
        reg.begin_processing("j1", settings()).unwrap();

        assert_eq!(rx.try_recv().unwrap().status, JobStatus::Uploaded);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.status, JobStatus::Processing);
        assert_eq!(event.run_key.as_deref(), Some("j1_rapidocr_force_true_1"));
    }
}
