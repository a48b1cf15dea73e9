//! Job records, the registry state machine and transition events.

pub mod events;
pub mod record;
pub mod registry;

pub use events::{JobEvent, JobEventBroadcaster};
pub use record::{
    FailureKind, JobFailure, JobRecord, JobSettings, JobStatus, RequestedKind, ResultSummary,
    RunEntry, RunOutcome,
};
pub use registry::{JobCounts, JobRegistry};
