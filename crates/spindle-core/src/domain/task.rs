//! Task - プールに投入される実行単位
//!
//! 引数なしで呼ばれ、成功か失敗（エラー）だけを返す。
//! どのワーカーで実行されるかは保証しない。

use std::fmt;

/// Boxed error returned by a failing task.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a task reports when it returns.
pub type TaskResult = Result<(), BoxError>;

/// A zero-argument unit of work.
///
/// Owned by exactly one runner at a time and consumed by `call`.
pub struct Task {
    f: Box<dyn FnOnce() -> TaskResult + Send + 'static>,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self { f: Box::new(f) }
    }

    /// Invoke the task on the current thread.
    pub fn call(self) -> TaskResult {
        (self.f)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
