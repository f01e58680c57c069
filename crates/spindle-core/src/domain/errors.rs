//! Errors - エラー型と分類
//!
//! - `TaskError`: 1 回のタスク実行の失敗（ワーカーのポリシー判断に使う）
//! - `PoolError`: プールの状態遷移違反（submit after stop, double stop など）

use std::time::Duration;

use thiserror::Error;

use super::state::PoolState;
use super::task::BoxError;

/// Why a task run did not succeed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task itself returned an error.
    #[error("{0}")]
    Failed(#[source] BoxError),

    /// The deadline elapsed before the task reported back.
    #[error("timeout: task took longer than {0:?} to respond")]
    Timeout(Duration),

    #[error("task panicked: {0}")]
    Panicked(String),

    /// The runtime dropped the execution before it reported back.
    #[error("task execution was cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_))
    }
}

/// Misuse of the pool lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool has not been started")]
    NotStarted,

    #[error("worker pool already started (state={0})")]
    AlreadyStarted(PoolState),

    #[error("worker pool must be started inside a tokio runtime")]
    NoRuntime,

    #[error("cannot submit: worker pool is {0}")]
    Closed(PoolState),

    #[error("worker pool already stopped")]
    AlreadyStopped,

    /// Every worker exited while the submit was waiting for a slot.
    #[error("task queue closed: no live workers")]
    QueueClosed,

    /// The supervisor task went away without publishing a report
    /// (runtime shut down mid-stop).
    #[error("worker pool shut down before producing a report")]
    ReportLost,
}
