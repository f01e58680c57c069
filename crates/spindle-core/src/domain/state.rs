//! State - プールとワーカーの状態
//!
//! # 状態遷移（プール）
//! - Created → Started（start）
//! - Started → Stopping（stop: キューを閉じる）
//! - Stopping → Stopped（全ワーカー終了）
//!
//! # 状態遷移（ワーカー）
//! - WarmingUp → Running
//! - Running → Exhausted（キューが閉じて空）
//! - Running → Failed（タスクがエラー/タイムアウト、ExitWorker ポリシー時）
//! - Running → WarmingUp（Restart ポリシー時）

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a worker pool. There is no transition back to `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Created,
    Started,
    Stopping,
    Stopped,
}

impl PoolState {
    /// Only a started pool takes submissions.
    pub fn accepts_tasks(self) -> bool {
        matches!(self, PoolState::Started)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, PoolState::Stopping | PoolState::Stopped)
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolState::Created => "created",
            PoolState::Started => "started",
            PoolState::Stopping => "stopping",
            PoolState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting out the ramp-up delay.
    WarmingUp,

    /// Pulling and executing tasks.
    Running,

    /// Queue closed and empty.
    Exhausted,

    /// Left early after a task error.
    Failed,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Exhausted | WorkerState::Failed)
    }
}

/// What a worker does after a task run reports an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The worker loop exits; pool capacity shrinks by one for good.
    #[default]
    ExitWorker,

    /// Log the error and take the next task.
    Continue,

    /// Go back through the ramp-up delay, then keep consuming.
    Restart,
}
