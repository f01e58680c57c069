//! Domain identifiers (strongly-typed IDs).
//!
//! - `RunId`: 1 回のタスク実行（TaskRun）ごとに振られる相関 ID。値そのものに意味はない。
//! - `WorkerId`: プール内のワーカー番号（0 始まり）。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Correlation id attached to a single task run.
///
/// ULID ベース。生成方法は `ports::RunIdGenerator` で差し替えられる。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Build an id from a plain counter value (timestamp part is zero).
    pub fn from_sequence(n: u64) -> Self {
        Self(Ulid::from_parts(0, u128::from(n)))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for RunId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Index of a worker loop inside its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_display_has_prefix() {
        let id = RunId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("run-"));
    }

    #[test]
    fn sequence_ids_sort_by_counter() {
        let a = RunId::from_sequence(1);
        let b = RunId::from_sequence(2);
        assert!(a < b);
        assert_eq!(a.as_ulid().timestamp_ms(), 0);
    }

    #[test]
    fn worker_id_display_matches_worker_name() {
        assert_eq!(WorkerId::new(3).to_string(), "worker_3");
    }
}
