//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. ramp-up 分待つ（WarmingUp）
//! 2. 共有キューから 1 件取り出す（Running）
//! 3. Runner で実行（timeout 設定があれば timed run）
//! 4. エラーなら FailurePolicy に従う（抜ける / 続ける / ramp-up からやり直す）
//! 5. キューが閉じて空になったら終了（Exhausted）

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::app::builder::PoolConfig;
use crate::app::runner::TaskRun;
use crate::domain::{
    FailurePolicy, PoolEvent, RunId, Task, TaskError, WorkerId, WorkerState,
};
use crate::ports::{Clock, EventSink, RunIdGenerator};

/// State shared by the pool handle and all of its worker loops.
pub(crate) struct PoolShared {
    /// Receiving half of the bounded task queue.
    pub(crate) queue: Mutex<mpsc::Receiver<Task>>,
    pub(crate) config: PoolConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn RunIdGenerator>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) live_workers: AtomicUsize,
}

/// How one worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: WorkerId,
    pub state: WorkerState,
    /// Task runs that succeeded.
    pub completed: u64,
    /// Task runs that failed, timed out or panicked.
    pub failed: u64,
    pub restarts: u64,
}

impl WorkerReport {
    fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            state: WorkerState::WarmingUp,
            completed: 0,
            failed: 0,
            restarts: 0,
        }
    }

    /// Stand-in for a loop whose join handle returned an error.
    pub(crate) fn aborted(worker: WorkerId) -> Self {
        Self {
            state: WorkerState::Failed,
            ..Self::new(worker)
        }
    }
}

enum Pass {
    /// Queue closed and empty.
    Drained,
    /// A task run errored and the policy says stop consuming.
    Errored,
}

pub struct WorkerLoop {
    worker: WorkerId,
    shared: Arc<PoolShared>,
}

impl WorkerLoop {
    pub(crate) fn new(worker: WorkerId, shared: Arc<PoolShared>) -> Self {
        Self { worker, shared }
    }

    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::new(self.worker);

        loop {
            self.warm_up().await;
            report.state = WorkerState::Running;
            debug!(worker = %self.worker, "worker running");

            match self.consume(&mut report).await {
                Pass::Drained => {
                    report.state = WorkerState::Exhausted;
                    break;
                }
                Pass::Errored if self.shared.config.failure_policy == FailurePolicy::Restart => {
                    report.restarts += 1;
                    report.state = WorkerState::WarmingUp;
                    self.shared.sink.emit(&PoolEvent::WorkerRestarted {
                        worker: self.worker,
                        restarts: report.restarts,
                    });
                }
                Pass::Errored => {
                    report.state = WorkerState::Failed;
                    break;
                }
            }
        }

        self.retire(&report).await;
        report
    }

    async fn warm_up(&self) {
        let delay = self.shared.config.ramp_up;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn consume(&self, report: &mut WorkerReport) -> Pass {
        while let Some(task) = self.next_task().await {
            let (run_id, result) = self.execute(task).await;
            match result {
                Ok(()) => report.completed += 1,
                Err(err) => {
                    report.failed += 1;
                    self.shared.sink.emit(&PoolEvent::TaskFailed {
                        run_id,
                        worker: self.worker,
                        error: err.to_string(),
                        timed_out: err.is_timeout(),
                    });
                    if self.shared.config.failure_policy != FailurePolicy::Continue {
                        return Pass::Errored;
                    }
                }
            }
        }
        Pass::Drained
    }

    async fn next_task(&self) -> Option<Task> {
        // ロックは recv の間だけ。実行中は保持しない
        let mut queue = self.shared.queue.lock().await;
        queue.recv().await
    }

    async fn execute(&self, task: Task) -> (RunId, Result<(), TaskError>) {
        let config = &self.shared.config;
        let run = TaskRun::new(self.shared.ids.next_run_id(), task)
            .on_worker(self.worker)
            .log_runtime(config.log_runtimes)
            .with_clock(Arc::clone(&self.shared.clock))
            .with_sink(Arc::clone(&self.shared.sink));
        let run_id = run.run_id();

        let result = match config.task_timeout {
            Some(timeout) => run.run_with_timeout(timeout).await.into_result(),
            None => match tokio::task::spawn_blocking(move || run.run()).await {
                Ok(completed) => completed.into_result(),
                Err(_join_err) => Err(TaskError::Cancelled),
            },
        };
        (run_id, result)
    }

    async fn retire(&self, report: &WorkerReport) {
        debug_assert!(report.state.is_terminal(), "worker retired in {:?}", report.state);
        self.shared.sink.emit(&PoolEvent::WorkerExited {
            worker: self.worker,
            state: report.state,
            completed: report.completed,
            failed: report.failed,
        });

        // 最後のワーカーが抜けたらキューを閉じる。空きを待っている submit は QueueClosed で返る
        if self.shared.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!(worker = %self.worker, "last worker gone, closing task queue");
            self.shared.queue.lock().await.close();
        }
    }
}
