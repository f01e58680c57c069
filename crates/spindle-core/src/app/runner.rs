//! Runner - 1 回のタスク実行を計測するラッパー
//!
//! `TaskRun`（未実行）を `run()` / `run_with_timeout()` で消費すると `CompletedRun` になる。
//! 開始・終了時刻は必ず両方セットされ、ランタイムのログ（TaskRuntime イベント）もここで出す。
//!
//! # タイムアウトは協調的キャンセルのみ
//! `run_with_timeout` はタスクを `spawn_blocking` で別スレッドに逃がし、deadline と競争させる。
//! deadline が先に来た場合、JoinHandle を捨てるだけでスレッドは止めない。
//! タスクはそのまま走り続け、結果は誰にも読まれずに捨てられる（既知のリソースリーク）。
//!
//! tokio の `Runtime` は drop 時に `spawn_blocking` のスレッドがすべて終わるまで待つ。
//! 本当に返らないタスクが 1 つでもあると、`stop()` は返ってもプロセスの終了
//! （`#[tokio::main]` や `#[tokio::test]` の末尾）で止まったままになる。
//! そういうタスクを流しうる場合は runtime を自前で作り、
//! `Runtime::shutdown_timeout` か `Runtime::shutdown_background` で畳むこと。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{Metrics, PoolEvent, RunId, RunOutcome, Task, TaskError, WorkerId};
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, SystemClock};

/// Everything a run needs besides the task itself.
struct RunContext {
    run_id: RunId,
    worker: Option<WorkerId>,
    log_runtime: bool,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl RunContext {
    fn finish(self, started_at: DateTime<Utc>, result: Result<(), TaskError>) -> CompletedRun {
        let stopped_at = self.clock.now().max(started_at);
        let completed = CompletedRun {
            run_id: self.run_id,
            worker: self.worker,
            started_at,
            stopped_at,
            result,
        };

        if self.log_runtime {
            self.sink.emit(&PoolEvent::TaskRuntime {
                run_id: completed.run_id,
                worker: completed.worker,
                runtime: completed.runtime().unwrap_or_default(),
                outcome: completed.outcome(),
            });
        }
        completed
    }
}

/// A task that has been handed to a runner but not executed yet.
pub struct TaskRun {
    ctx: RunContext,
    task: Task,
}

impl TaskRun {
    /// Defaults: system clock, tracing sink, runtime logging on.
    pub fn new(run_id: RunId, task: Task) -> Self {
        Self {
            ctx: RunContext {
                run_id,
                worker: None,
                log_runtime: true,
                clock: Arc::new(SystemClock),
                sink: Arc::new(TracingEventSink),
            },
            task,
        }
    }

    pub fn on_worker(mut self, worker: WorkerId) -> Self {
        self.ctx.worker = Some(worker);
        self
    }

    pub fn log_runtime(mut self, enabled: bool) -> Self {
        self.ctx.log_runtime = enabled;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.ctx.sink = sink;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.ctx.run_id
    }

    /// Run on the calling thread. A panic in the task is caught and reported.
    pub fn run(self) -> CompletedRun {
        let TaskRun { ctx, task } = self;
        let started_at = ctx.clock.now();
        let result = invoke(task);
        ctx.finish(started_at, result)
    }

    /// Run on a blocking thread and give up on it after `timeout`.
    ///
    /// Only one side of the race is observed. On timeout the thread is left
    /// running; see the module docs.
    pub async fn run_with_timeout(self, timeout: Duration) -> CompletedRun {
        let TaskRun { ctx, task } = self;
        let started_at = ctx.clock.now();

        let handle = tokio::task::spawn_blocking(move || invoke(task));
        let result = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            // invoke() は panic を捕まえるので、ここに来るのは runtime 側の中断のみ
            Ok(Err(_join_err)) => Err(TaskError::Cancelled),
            Err(_elapsed) => Err(TaskError::Timeout(timeout)),
        };

        ctx.finish(started_at, result)
    }
}

fn invoke(task: Task) -> Result<(), TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(|| task.call())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A finished task run: both timestamps set, outcome known.
#[derive(Debug)]
pub struct CompletedRun {
    run_id: RunId,
    worker: Option<WorkerId>,
    started_at: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
    result: Result<(), TaskError>,
}

impl CompletedRun {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn worker(&self) -> Option<WorkerId> {
        self.worker
    }

    pub fn result(&self) -> &Result<(), TaskError> {
        &self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome::from_result(&self.result)
    }

    pub fn into_result(self) -> Result<(), TaskError> {
        self.result
    }
}

impl Metrics for CompletedRun {
    fn started_at(&self) -> Option<DateTime<Utc>> {
        Some(self.started_at)
    }

    fn stopped_at(&self) -> Option<DateTime<Utc>> {
        Some(self.stopped_at)
    }
}
