//! spindle-core
//!
//! Bounded worker pool with per-task timeouts and timing metrics.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, state, errors, events, metrics）
//! - **ports**: 抽象化レイヤー（Clock, RunIdGenerator, EventSink）
//! - **app**: builder, runner, worker_loop, pool
//! - **impls**: EventSink の実装（Tracing / Memory / Noop）
//!
//! ```ignore
//! let pool = WorkerPool::builder(3)
//!     .task_timeout(Some(Duration::from_secs(2)))
//!     .build()?;
//! pool.start()?;
//! pool.submit(|| Ok(())).await?;
//! let report = pool.stop().await?;
//! ```

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{BuildError, PoolBuilder, PoolConfig, PoolReport, WorkerPool};
pub use domain::{FailurePolicy, Metrics, PoolError, PoolEvent, Task, TaskError, TaskResult};
