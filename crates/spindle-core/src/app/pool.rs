//! WorkerPool - 固定数ワーカーと有界キュー
//!
//! # ライフサイクル
//! `Created → Started → Stopping → Stopped`（戻りはない）
//!
//! - キュー容量 = ワーカー数。満杯なら submit は空きが出るまで待つ（backpressure）
//! - stop はキューを閉じ、全ワーカーの終了（drain または早期終了）を待つ
//! - 状態違反（start 二重呼び出し、stop 後の submit など）は panic ではなく `PoolError` で返す
//!
//! # 終了処理は supervisor タスクが持つ
//! start 時に worker の JoinHandle を supervisor に渡す。stop はキューを閉じて合図を送り、
//! supervisor が公開する `PoolReport` を待つだけ。stop の future が途中で drop されても
//! supervisor は join → 集計 → `Stopped` まで進み、次の stop / `report()` で結果を受け取れる。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::builder::{BuildError, PoolBuilder, PoolConfig};
use crate::app::worker_loop::{PoolShared, WorkerLoop, WorkerReport};
use crate::domain::{
    Metrics, PoolError, PoolEvent, PoolMetrics, PoolState, Task, TaskResult, WorkerId,
    WorkerState,
};
use crate::ports::{Clock, EventSink, RunIdGenerator};

type ReportSender = watch::Sender<Option<PoolReport>>;

/// Mutable pool bookkeeping, shared with the supervisor task.
/// The guard is never held across an `.await`.
struct PoolInner {
    state: PoolState,
    /// `None` once stop has closed the queue for writers.
    sender: Option<mpsc::Sender<Task>>,
    /// Wakes the supervisor. Dropping it unsent also wakes it.
    stop_signal: Option<oneshot::Sender<()>>,
    /// Moved into the supervisor by `start`.
    report_tx: Option<ReportSender>,
    metrics: PoolMetrics,
}

fn lock(inner: &Mutex<PoolInner>) -> MutexGuard<'_, PoolInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fixed set of worker loops fed from one bounded queue.
///
/// Methods take `&self`, so the pool can sit behind an `Arc` and be fed
/// from several submitters at once. `start` must be called from inside a
/// tokio runtime.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    inner: Arc<Mutex<PoolInner>>,
    finished: watch::Receiver<Option<PoolReport>>,
}

impl WorkerPool {
    pub fn builder(workers: usize) -> PoolBuilder {
        PoolBuilder::new(workers)
    }

    /// Pool with default settings (no ramp-up, 2s timeout, exit on error).
    pub fn new(workers: usize) -> Result<Self, BuildError> {
        Self::builder(workers).build()
    }

    pub(crate) fn from_parts(
        config: PoolConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn RunIdGenerator>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.workers);
        let (report_tx, finished) = watch::channel(None);
        let shared = PoolShared {
            queue: tokio::sync::Mutex::new(receiver),
            config,
            clock,
            ids,
            sink,
            live_workers: AtomicUsize::new(0),
        };
        Self {
            shared: Arc::new(shared),
            inner: Arc::new(Mutex::new(PoolInner {
                state: PoolState::Created,
                sender: Some(sender),
                stop_signal: None,
                report_tx: Some(report_tx),
                metrics: PoolMetrics::default(),
            })),
            finished,
        }
    }

    fn inner(&self) -> MutexGuard<'_, PoolInner> {
        lock(&self.inner)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn worker_count(&self) -> usize {
        self.shared.config.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.config.workers
    }

    pub fn state(&self) -> PoolState {
        self.inner().state
    }

    /// Worker loops that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.inner().metrics
    }

    /// The final report, once the pool has reached `Stopped`.
    pub fn report(&self) -> Option<PoolReport> {
        self.finished.borrow().as_ref().cloned()
    }

    /// Launch the worker loops and their supervisor. Valid once, from `Created`.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut inner = self.inner();
        if inner.state != PoolState::Created {
            return Err(PoolError::AlreadyStarted(inner.state));
        }
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        // Created の間は必ず残っている
        let Some(report_tx) = inner.report_tx.take() else {
            return Err(PoolError::AlreadyStarted(inner.state));
        };

        let workers = self.worker_count();
        let started_at = self.shared.clock.now();
        inner.metrics.mark_started(started_at);
        self.shared.sink.emit(&PoolEvent::PoolStarted {
            workers,
            started_at,
        });

        self.shared.live_workers.store(workers, Ordering::Release);
        let handles = (0..workers)
            .map(|i| {
                let worker = WorkerLoop::new(WorkerId::new(i), Arc::clone(&self.shared));
                runtime.spawn(worker.run())
            })
            .collect();

        let (stop_signal, stop_requested) = oneshot::channel();
        let supervisor = Supervisor {
            shared: Arc::clone(&self.shared),
            inner: Arc::clone(&self.inner),
            workers: handles,
            report_tx,
        };
        runtime.spawn(supervisor.run(stop_requested));

        inner.stop_signal = Some(stop_signal);
        inner.state = PoolState::Started;
        Ok(())
    }

    /// Enqueue a closure. See [`WorkerPool::submit_task`].
    pub async fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        self.submit_task(Task::new(task)).await
    }

    /// Enqueue a task, waiting for a free slot when the queue is full.
    ///
    /// The task's outcome is never reported back here; it only shows up in
    /// events and in the report returned by `stop`.
    pub async fn submit_task(&self, task: Task) -> Result<(), PoolError> {
        let sender = {
            let inner = self.inner();
            let state = inner.state;
            if state.is_closed() {
                return Err(PoolError::Closed(state));
            }
            if !state.accepts_tasks() {
                return Err(PoolError::NotStarted);
            }
            inner.sender.clone().ok_or(PoolError::Closed(state))?
        };

        sender
            .send(task)
            .await
            .map_err(|_| PoolError::QueueClosed)
    }

    /// Close the queue, wait for every worker loop to exit, record the stop time.
    ///
    /// Workers that are still alive drain whatever is queued first. Tasks
    /// left behind because every worker already failed are counted in
    /// `PoolReport::unprocessed`.
    ///
    /// Cancel-safe: if this future is dropped the pool still finishes
    /// stopping in the background, and a later `stop` in `Stopping` waits
    /// for the same report.
    pub async fn stop(&self) -> Result<PoolReport, PoolError> {
        {
            let mut inner = self.inner();
            match inner.state {
                PoolState::Created => return Err(PoolError::NotStarted),
                PoolState::Stopped => return Err(PoolError::AlreadyStopped),
                PoolState::Started => {
                    inner.state = PoolState::Stopping;
                    inner.sender = None;
                    if let Some(signal) = inner.stop_signal.take() {
                        let _ = signal.send(());
                    }
                }
                // 先に呼ばれた stop の後始末は supervisor が続けている
                PoolState::Stopping => {}
            }
        }

        let mut finished = self.finished.clone();
        let report = finished
            .wait_for(Option::is_some)
            .await
            .map_err(|_| PoolError::ReportLost)?
            .as_ref()
            .cloned();
        report.ok_or(PoolError::ReportLost)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // stop されずに捨てられた場合: キューを閉じ、supervisor に後始末を任せる
        let mut inner = self.inner();
        inner.sender = None;
        inner.stop_signal = None;
    }
}

/// Owns the worker handles and finishes the pool once stop is requested.
struct Supervisor {
    shared: Arc<PoolShared>,
    inner: Arc<Mutex<PoolInner>>,
    workers: Vec<JoinHandle<WorkerReport>>,
    report_tx: ReportSender,
}

impl Supervisor {
    async fn run(self, stop_requested: oneshot::Receiver<()>) {
        let Supervisor {
            shared,
            inner,
            workers: handles,
            report_tx,
        } = self;

        // Err はプールが stop されずに drop されたとき。どちらでも終了処理に進む
        let _ = stop_requested.await;
        debug!(workers = handles.len(), "waiting for workers to drain the queue");

        let mut workers = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(report) => workers.push(report),
                Err(e) => {
                    warn!(worker = index, error = %e, "worker loop did not finish cleanly");
                    workers.push(WorkerReport::aborted(WorkerId::new(index)));
                }
            }
        }

        let unprocessed = {
            let mut queue = shared.queue.lock().await;
            queue.close();
            let mut left = 0;
            while queue.try_recv().is_ok() {
                left += 1;
            }
            left
        };
        if unprocessed > 0 {
            warn!(unprocessed, "tasks left in the queue with no worker to run them");
        }

        let metrics = {
            let mut inner = lock(&inner);
            inner.metrics.mark_stopped(shared.clock.now());
            inner.state = PoolState::Stopped;
            inner.metrics
        };
        let runtime = metrics.runtime().unwrap_or_default();
        if let Some(stopped_at) = metrics.stopped_at() {
            shared
                .sink
                .emit(&PoolEvent::PoolStopped { stopped_at, runtime });
        }

        report_tx.send_replace(Some(PoolReport {
            metrics,
            workers,
            unprocessed,
        }));
    }
}

/// End-of-run summary returned by [`WorkerPool::stop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolReport {
    pub metrics: PoolMetrics,
    /// One entry per worker, in worker order.
    pub workers: Vec<WorkerReport>,
    /// Tasks still queued when the last worker was gone.
    pub unprocessed: usize,
}

impl PoolReport {
    pub fn runtime(&self) -> Option<Duration> {
        self.metrics.runtime()
    }

    pub fn completed(&self) -> u64 {
        self.workers.iter().map(|w| w.completed).sum()
    }

    pub fn failed(&self) -> u64 {
        self.workers.iter().map(|w| w.failed).sum()
    }

    /// Workers that ran until the queue was drained.
    pub fn surviving_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state == WorkerState::Exhausted)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunOutcome;
    use crate::impls::{MemoryEventSink, NoopEventSink};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn quiet_pool(workers: usize) -> WorkerPool {
        WorkerPool::builder(workers)
            .event_sink(Arc::new(NoopEventSink))
            .build()
            .unwrap()
    }

    #[rstest]
    #[case::one(1)]
    #[case::three(3)]
    #[case::eight(8)]
    #[tokio::test]
    async fn start_launches_one_loop_per_worker(#[case] workers: usize) {
        let pool = quiet_pool(workers);
        pool.start().unwrap();
        assert_eq!(pool.state(), PoolState::Started);
        assert_eq!(pool.live_workers(), workers);

        let report = pool.stop().await.unwrap();
        assert_eq!(report.workers.len(), workers);
        assert_eq!(report.surviving_workers(), workers);
        assert_eq!(pool.live_workers(), 0);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let pool = quiet_pool(1);
        pool.start().unwrap();
        assert_eq!(
            pool.start(),
            Err(PoolError::AlreadyStarted(PoolState::Started))
        );
        pool.stop().await.unwrap();
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let pool = quiet_pool(2);
        assert_eq!(pool.start(), Err(PoolError::NoRuntime));
        assert_eq!(pool.state(), PoolState::Created);
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.metrics().started_at(), None);
    }

    #[tokio::test]
    async fn submit_before_start_is_rejected() {
        let pool = quiet_pool(1);
        assert_eq!(pool.submit(|| Ok(())).await, Err(PoolError::NotStarted));
        assert_eq!(pool.stop().await.unwrap_err(), PoolError::NotStarted);
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let pool = quiet_pool(2);
        pool.start().unwrap();
        pool.stop().await.unwrap();

        assert_eq!(
            pool.submit(|| Ok(())).await,
            Err(PoolError::Closed(PoolState::Stopped))
        );
    }

    #[tokio::test]
    async fn double_stop_is_rejected() {
        let pool = quiet_pool(2);
        pool.start().unwrap();
        pool.stop().await.unwrap();

        assert_eq!(pool.stop().await.unwrap_err(), PoolError::AlreadyStopped);
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn submits_up_to_capacity_do_not_block() {
        let pool = WorkerPool::builder(2)
            .ramp_up(Duration::from_millis(300))
            .event_sink(Arc::new(MemoryEventSink::new()))
            .build()
            .unwrap();
        pool.start().unwrap();

        // ワーカーは ramp-up 中なので、容量ぶんだけキューに積める
        for _ in 0..pool.queue_capacity() {
            tokio::time::timeout(Duration::from_millis(50), pool.submit(|| Ok(())))
                .await
                .expect("submit within capacity must not block")
                .unwrap();
        }
        let over = tokio::time::timeout(Duration::from_millis(50), pool.submit(|| Ok(()))).await;
        assert!(over.is_err(), "submit beyond capacity should wait for a slot");

        // ramp-up が明ければ空きができる
        tokio::time::timeout(Duration::from_secs(2), pool.submit(|| Ok(())))
            .await
            .unwrap()
            .unwrap();

        let report = pool.stop().await.unwrap();
        assert_eq!(report.completed(), 3);
    }

    #[tokio::test]
    async fn stop_drains_pending_tasks() {
        let pool = WorkerPool::builder(2)
            .ramp_up(Duration::from_millis(100))
            .event_sink(Arc::new(MemoryEventSink::new()))
            .build()
            .unwrap();
        pool.start().unwrap();
        pool.submit(|| Ok(())).await.unwrap();
        pool.submit(|| Ok(())).await.unwrap();

        // stop の時点ではまだ誰も取り出していない
        let report = pool.stop().await.unwrap();
        assert_eq!(report.completed(), 2);
        assert_eq!(report.unprocessed, 0);
    }

    #[tokio::test]
    async fn submit_fails_once_every_worker_is_gone() {
        let pool = quiet_pool(1);
        pool.start().unwrap();
        pool.submit(|| Err("fatal".into())).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while pool.live_workers() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "worker never exited");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(pool.submit(|| Ok(())).await, Err(PoolError::QueueClosed));
        let report = pool.stop().await.unwrap();
        assert_eq!(report.workers[0].state, WorkerState::Failed);
        assert_eq!(report.surviving_workers(), 0);
    }

    fn slow_single_worker(sink: Arc<MemoryEventSink>) -> WorkerPool {
        WorkerPool::builder(1).event_sink(sink).build().unwrap()
    }

    async fn wait_for_state(pool: &WorkerPool, state: PoolState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while pool.state() != state {
            assert!(tokio::time::Instant::now() < deadline, "pool never reached {state}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn cancelled_stop_still_reaches_stopped() {
        let sink = Arc::new(MemoryEventSink::new());
        let pool = slow_single_worker(sink.clone());
        pool.start().unwrap();
        pool.submit(|| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await
        .unwrap();

        let cancelled = tokio::time::timeout(Duration::from_millis(20), pool.stop()).await;
        assert!(cancelled.is_err());
        assert_eq!(pool.state(), PoolState::Stopping);
        assert_eq!(pool.report(), None);

        wait_for_state(&pool, PoolState::Stopped).await;

        assert!(pool.metrics().stopped_at().is_some());
        assert!(matches!(sink.events().last(), Some(PoolEvent::PoolStopped { .. })));
        let report = pool.report().unwrap();
        assert_eq!(report.completed(), 1);
        assert_eq!(report.metrics, pool.metrics());
        assert_eq!(pool.stop().await.unwrap_err(), PoolError::AlreadyStopped);
    }

    #[tokio::test]
    async fn stop_after_cancelled_stop_returns_the_report() {
        let sink = Arc::new(MemoryEventSink::new());
        let pool = slow_single_worker(sink.clone());
        pool.start().unwrap();
        pool.submit(|| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await
        .unwrap();

        let _ = tokio::time::timeout(Duration::from_millis(20), pool.stop()).await;
        let report = pool.stop().await.unwrap();

        assert_eq!(report.completed(), 1);
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(
            sink.count(|e| matches!(e, PoolEvent::PoolStopped { .. })),
            1
        );
    }

    #[tokio::test]
    async fn concurrent_stops_share_one_report() {
        let pool = Arc::new(quiet_pool(2));
        pool.start().unwrap();
        pool.submit(|| Ok(())).await.unwrap();

        let other = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.stop().await })
        };
        let mine = pool.stop().await.unwrap();
        let theirs = other.await.unwrap().unwrap();

        assert_eq!(mine, theirs);
        assert_eq!(mine.completed(), 1);
    }

    #[tokio::test]
    async fn dropping_a_started_pool_still_drains_and_finishes() {
        let sink = Arc::new(MemoryEventSink::new());
        let pool = slow_single_worker(sink.clone());
        pool.start().unwrap();
        pool.submit(|| Ok(())).await.unwrap();
        drop(pool);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while sink.count(|e| matches!(e, PoolEvent::PoolStopped { .. })) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "supervisor never finished");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            sink.count(|e| matches!(
                e,
                PoolEvent::TaskRuntime { outcome: RunOutcome::Succeeded, .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn pool_metrics_follow_clock() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(t0));
        let sink = Arc::new(MemoryEventSink::new());
        let pool = WorkerPool::builder(1)
            .clock(clock.clone())
            .event_sink(sink.clone())
            .build()
            .unwrap();

        pool.start().unwrap();
        assert_eq!(pool.metrics().started_at(), Some(t0));
        assert_eq!(pool.metrics().stopped_at(), None);

        clock.advance(chrono::Duration::seconds(90));
        let report = pool.stop().await.unwrap();

        assert_eq!(report.runtime(), Some(Duration::from_secs(90)));
        assert_eq!(pool.metrics(), report.metrics);
        assert!(matches!(
            sink.events().last(),
            Some(PoolEvent::PoolStopped { runtime, .. }) if *runtime == Duration::from_secs(90)
        ));
    }

    #[tokio::test]
    async fn events_trace_the_whole_lifecycle() {
        let sink = Arc::new(MemoryEventSink::new());
        let pool = WorkerPool::builder(2)
            .event_sink(sink.clone())
            .build()
            .unwrap();
        pool.start().unwrap();
        for _ in 0..4 {
            pool.submit(|| Ok(())).await.unwrap();
        }
        pool.stop().await.unwrap();

        let events = sink.events();
        assert!(matches!(events.first(), Some(PoolEvent::PoolStarted { workers: 2, .. })));
        assert!(matches!(events.last(), Some(PoolEvent::PoolStopped { .. })));
        assert_eq!(
            sink.count(|e| matches!(
                e,
                PoolEvent::TaskRuntime { outcome: RunOutcome::Succeeded, .. }
            )),
            4
        );
        assert_eq!(
            sink.count(|e| matches!(
                e,
                PoolEvent::WorkerExited { state: WorkerState::Exhausted, .. }
            )),
            2
        );
    }

    #[tokio::test]
    async fn runtime_events_can_be_silenced() {
        let sink = Arc::new(MemoryEventSink::new());
        let pool = WorkerPool::builder(1)
            .log_runtimes(false)
            .event_sink(sink.clone())
            .build()
            .unwrap();
        pool.start().unwrap();
        pool.submit(|| Ok(())).await.unwrap();
        pool.stop().await.unwrap();

        assert_eq!(
            sink.count(|e| matches!(e, PoolEvent::TaskRuntime { .. })),
            0
        );
    }

    #[tokio::test]
    async fn report_serializes_per_worker_summary() {
        let pool = quiet_pool(2);
        pool.start().unwrap();
        let report = pool.stop().await.unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["workers"].as_array().unwrap().len(), 2);
        assert_eq!(json["workers"][0]["state"], "exhausted");
        assert_eq!(json["unprocessed"], 0);
    }
}
