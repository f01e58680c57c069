//! App - アプリケーション層
//!
//! ports と domain を組み合わせてワーカープールを実装します。
//!
//! # 主要コンポーネント
//! - **PoolBuilder**: 設定検証とワイヤリング
//! - **TaskRun**: 1 回のタスク実行（計測 + timeout）
//! - **WorkerLoop**: タスク実行ループ（dequeue→run→policy）
//! - **WorkerPool**: start / submit / stop

pub mod builder;
pub mod pool;
pub mod runner;
pub mod worker_loop;

pub use self::builder::{BuildError, PoolBuilder, PoolConfig};
pub use self::pool::{PoolReport, WorkerPool};
pub use self::runner::{CompletedRun, TaskRun};
pub use self::worker_loop::{WorkerLoop, WorkerReport};
