//! TracingEventSink - PoolEvent を tracing に流すデフォルト実装
//!
//! 出力するメッセージ:
//! - "runtime: {d:?}"（タスクごと）
//! - "error {description}"（失敗したタスクごと）
//! - "workerpool runtime {d:?}"（stop 時）

use tracing::{debug, error, info, warn};

use crate::domain::{PoolEvent, WorkerState};
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PoolEvent) {
        match event {
            PoolEvent::PoolStarted { workers, started_at } => {
                info!(workers, %started_at, "workerpool started");
            }
            PoolEvent::TaskRuntime {
                run_id,
                worker,
                runtime,
                outcome,
            } => {
                let worker = worker.as_ref().map(|w| w.to_string());
                info!(
                    %run_id,
                    worker = worker.as_deref().unwrap_or("-"),
                    success = outcome.is_success(),
                    "runtime: {runtime:?}"
                );
            }
            PoolEvent::TaskFailed {
                run_id,
                worker,
                error,
                timed_out,
            } => {
                error!(%run_id, %worker, timed_out, "error {error}");
            }
            PoolEvent::WorkerRestarted { worker, restarts } => {
                warn!(%worker, restarts, "worker restarting after task error");
            }
            PoolEvent::WorkerExited {
                worker,
                state,
                completed,
                failed,
            } => match state {
                WorkerState::Failed => {
                    warn!(%worker, completed, failed, "worker left the pool early")
                }
                _ => debug!(%worker, ?state, completed, failed, "worker exited"),
            },
            PoolEvent::PoolStopped {
                stopped_at,
                runtime,
            } => {
                info!(%stopped_at, "workerpool runtime {runtime:?}");
            }
        }
    }
}
