//! Deadline-bounded execution of engine calls.
//!
//! The call runs on its own thread and hands its result back over a
//! one-slot channel. When the deadline passes first the caller gets
//! [`JobError::Timeout`] right away and the thread is abandoned: it is never
//! joined, and whatever it writes afterwards is left as orphaned artifacts.

use std::any::Any;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::error::{JobError, Result};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedExecutor {
    deadline: Duration,
}

impl BoundedExecutor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs `f` under this executor's deadline.
    pub fn execute<T, F>(&self, label: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        execute(label, f, self.deadline)
    }
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE)
    }
}

/// Runs `f` on a dedicated thread and waits at most `deadline` for it.
///
/// A panic inside `f` is reported as [`JobError::EngineFailure`].
pub fn execute<T, F>(label: &str, f: F, deadline: Duration) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = bounded::<Result<T>>(1);
    let span = tracing::Span::current();

    let handle = thread::Builder::new()
        .name(format!("engine-{}", label))
        .spawn(move || {
            let _guard = span.enter();
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(f());
        })
        .map_err(|e| JobError::EngineFailure(format!("Failed to spawn engine worker: {}", e)))?;

    match rx.recv_timeout(deadline) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!(
                "Engine call {} exceeded {}s deadline; abandoning worker",
                label,
                deadline.as_secs_f32()
            );
            drop(handle);
            Err(JobError::Timeout(deadline))
        }
        Err(RecvTimeoutError::Disconnected) => {
            let message = match handle.join() {
                Err(payload) => format!("Engine panicked: {}", panic_message(payload.as_ref())),
                Ok(()) => "Engine worker exited without a result".to_string(),
            };
            log::error!("Engine call {} failed: {}", label, message);
            Err(JobError::EngineFailure(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_returns_result_before_deadline() {
        let executor = BoundedExecutor::new(Duration::from_secs(5));
        let value = executor.execute("quick", || Ok(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_propagates_errors() {
        let executor = BoundedExecutor::new(Duration::from_secs(5));
        let err = executor
            .execute::<(), _>("broken", || Err(JobError::EngineFailure("bad".into())))
            .unwrap_err();
        assert!(matches!(err, JobError::EngineFailure(ref m) if m == "bad"));
    }

    #[test]
    fn test_times_out_without_waiting_for_worker() {
        let executor = BoundedExecutor::new(Duration::from_millis(100));
        let started = Instant::now();

        let err = executor
            .execute("hang", || {
                thread::sleep(Duration::from_secs(30));
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, JobError::Timeout(d) if d == Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_abandoned_worker_may_finish_later() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let result = execute(
            "slow",
            move || {
                thread::sleep(Duration::from_millis(200));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(20),
        );
        assert!(matches!(result, Err(JobError::Timeout(_))));
        assert!(!finished.load(Ordering::SeqCst));

        thread::sleep(Duration::from_millis(500));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panic_becomes_engine_failure() {
        let executor = BoundedExecutor::new(Duration::from_secs(5));
        let err = executor
            .execute::<(), _>("panics", || panic!("table model exploded"))
            .unwrap_err();
        match err {
            JobError::EngineFailure(message) => {
                assert!(message.contains("table model exploded"), "got: {}", message)
            }
            other => panic!("Expected EngineFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_executions_are_independent() {
        let started = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                thread::spawn(move || {
                    execute(
                        "parallel",
                        move || {
                            thread::sleep(Duration::from_millis(200));
                            Ok(i)
                        },
                        Duration::from_secs(5),
                    )
                })
            })
            .collect();

        let mut values: Vec<i32> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        values.sort();
        assert_eq!(values, vec![0, 1, 2, 3]);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_default_deadline() {
        assert_eq!(BoundedExecutor::default().deadline(), Duration::from_secs(600));
    }
}
