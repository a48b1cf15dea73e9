//! Job transition broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::record::{FailureKind, JobRecord, JobStatus};

/// Emitted once per committed state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_record(record: &JobRecord, message: &str) -> Self {
        Self {
            job_id: record.id.clone(),
            filename: record.original_name.clone(),
            status: record.status,
            run_key: record.current_run().map(|r| r.run_key.clone()),
            failure: record.error.as_ref().map(|e| e.kind),
            message: message.to_string(),
            timestamp: record.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers_is_ok() {
        let broadcaster = JobEventBroadcaster::default();
        let record = JobRecord::new("j", "a.pdf", "uploads/j.pdf", 3, None);
        broadcaster.send(JobEvent::from_record(&record, "uploaded"));
    }

    #[test]
    fn test_subscriber_receives_events() {
        let broadcaster = JobEventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let record = JobRecord::new("j", "a.pdf", "uploads/j.pdf", 3, None);
        broadcaster.send(JobEvent::from_record(&record, "Document uploaded"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.job_id, "j");
        assert_eq!(event.status, JobStatus::Uploaded);
        assert!(event.run_key.is_none());
        assert_eq!(event.message, "Document uploaded");
    }

    #[test]
    fn test_clones_share_channel() {
        let broadcaster = JobEventBroadcaster::new(8);
        let clone = broadcaster.clone();
        let mut rx = broadcaster.subscribe();

        let record = JobRecord::new("k", "b.pdf", "uploads/k.pdf", 3, None);
        clone.send(JobEvent::from_record(&record, "from clone"));

        assert_eq!(rx.try_recv().unwrap().job_id, "k");
    }
}
