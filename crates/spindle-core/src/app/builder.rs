//! PoolBuilder - ワーカープールの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: worker 数 0 や timeout 0 は build() で弾く
//! - ports（Clock, RunIdGenerator, EventSink）の差し込み

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::pool::WorkerPool;
use crate::domain::FailurePolicy;
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, RunIdGenerator, SystemClock, UlidGenerator};

/// Tuning knobs of a pool. Immutable once the pool is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker loops; also the queue capacity.
    pub workers: usize,

    /// Pause before a worker starts pulling tasks (and again after a restart).
    pub ramp_up: Duration,

    /// `None` runs tasks without a deadline.
    pub task_timeout: Option<Duration>,

    pub failure_policy: FailurePolicy,

    /// Emit a `TaskRuntime` event for every run.
    pub log_runtimes: bool,
}

impl PoolConfig {
    pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ramp_up: Duration::ZERO,
            task_timeout: Some(Self::DEFAULT_TASK_TIMEOUT),
            failure_policy: FailurePolicy::ExitWorker,
            log_runtimes: true,
        }
    }

    /// 1s ramp-up, 2s timeout, exit on the first error.
    pub fn reference(workers: usize) -> Self {
        Self {
            ramp_up: Duration::from_secs(1),
            ..Self::new(workers)
        }
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.workers == 0 {
            return Err(BuildError::InvalidWorkerCount(self.workers));
        }
        if self.task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BuildError::ZeroTimeout);
        }
        Ok(())
    }
}

/// BuildError はプール構築時のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("worker count must be positive, got {0}")]
    InvalidWorkerCount(usize),

    #[error("task timeout must be non-zero")]
    ZeroTimeout,
}

/// PoolBuilder は WorkerPool を構築
///
/// # 使用例
/// ```ignore
/// let pool = WorkerPool::builder(4)
///     .task_timeout(Some(Duration::from_millis(500)))
///     .failure_policy(FailurePolicy::Continue)
///     .build()?;
/// ```
pub struct PoolBuilder {
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn RunIdGenerator>>,
    sink: Arc<dyn EventSink>,
}

impl PoolBuilder {
    pub fn new(workers: usize) -> Self {
        Self::from_config(PoolConfig::new(workers))
    }

    pub fn from_config(config: PoolConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            ids: None,
            sink: Arc::new(TracingEventSink),
        }
    }

    pub fn ramp_up(mut self, delay: Duration) -> Self {
        self.config.ramp_up = delay;
        self
    }

    pub fn task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.task_timeout = timeout;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn log_runtimes(mut self, enabled: bool) -> Self {
        self.config.log_runtimes = enabled;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn RunIdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the config and wire the pool. Does not spawn anything.
    pub fn build(self) -> Result<WorkerPool, BuildError> {
        self.config.validate()?;
        let ids = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };
        Ok(WorkerPool::from_parts(self.config, self.clock, ids, self.sink))
    }
}
