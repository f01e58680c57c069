//! Events - プールで発生したイベント
//!
//! ログは EventSink を通して出す。テストでは MemoryEventSink でイベントを捕まえて検証する。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TaskError;
use super::ids::{RunId, WorkerId};
use super::state::WorkerState;

/// Serializable summary of how a task run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed { reason: String },
    TimedOut { timeout: Duration },
    Panicked { message: String },
    Cancelled,
}

impl RunOutcome {
    pub fn from_result(result: &Result<(), TaskError>) -> Self {
        match result {
            Ok(()) => RunOutcome::Succeeded,
            Err(TaskError::Failed(e)) => RunOutcome::Failed {
                reason: e.to_string(),
            },
            Err(TaskError::Timeout(timeout)) => RunOutcome::TimedOut { timeout: *timeout },
            Err(TaskError::Panicked(message)) => RunOutcome::Panicked {
                message: message.clone(),
            },
            Err(TaskError::Cancelled) => RunOutcome::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Everything observable about a pool while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    PoolStarted {
        workers: usize,
        started_at: DateTime<Utc>,
    },

    /// Emitted by the runner when runtime logging is enabled for the run.
    TaskRuntime {
        run_id: RunId,
        worker: Option<WorkerId>,
        runtime: Duration,
        outcome: RunOutcome,
    },

    TaskFailed {
        run_id: RunId,
        worker: WorkerId,
        error: String,
        timed_out: bool,
    },

    WorkerRestarted {
        worker: WorkerId,
        restarts: u64,
    },

    WorkerExited {
        worker: WorkerId,
        state: WorkerState,
        completed: u64,
        failed: u64,
    },

    PoolStopped {
        stopped_at: DateTime<Utc>,
        runtime: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_timeout_keeps_deadline() {
        let result = Err(TaskError::Timeout(Duration::from_millis(250)));
        assert_eq!(
            RunOutcome::from_result(&result),
            RunOutcome::TimedOut {
                timeout: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn outcome_from_failure_keeps_reason() {
        let result = Err(TaskError::Failed("bad input".into()));
        let outcome = RunOutcome::from_result(&result);
        assert!(!outcome.is_success());
        assert_eq!(
            outcome,
            RunOutcome::Failed {
                reason: "bad input".to_string()
            }
        );
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = PoolEvent::WorkerRestarted {
            worker: WorkerId::new(1),
            restarts: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "worker_restarted");
        assert_eq!(json["restarts"], 2);
    }
}
