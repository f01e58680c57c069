//! Domain model (IDs, task, state, errors, events, metrics).

pub mod errors;
pub mod events;
pub mod ids;
pub mod metrics;
pub mod state;
pub mod task;

pub use self::errors::{PoolError, TaskError};
pub use self::events::{PoolEvent, RunOutcome};
pub use self::ids::{RunId, WorkerId};
pub use self::metrics::{Metrics, PoolMetrics};
pub use self::state::{FailurePolicy, PoolState, WorkerState};
pub use self::task::{BoxError, Task, TaskResult};
