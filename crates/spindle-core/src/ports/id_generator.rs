//! RunIdGenerator port - 実行 ID 生成の抽象化
//!
//! ID の値そのものに意味はない（ログの相関用）。テスト容易性のために trait として抽象化している。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（時刻 + 乱数、デフォルト）
//! - **SequenceGenerator**: 連番
//! - クロージャ: `Fn() -> RunId` を呼び出し側が渡せる

use std::sync::atomic::{AtomicU64, Ordering};

use ulid::Ulid;

use crate::domain::RunId;
use crate::ports::Clock;

/// Produces the correlation id for each task run.
///
/// # Thread Safety
/// - `Send + Sync` を要求（全ワーカーから共有される）
pub trait RunIdGenerator: Send + Sync {
    fn next_run_id(&self) -> RunId;
}

impl<F> RunIdGenerator for F
where
    F: Fn() -> RunId + Send + Sync,
{
    fn next_run_id(&self) -> RunId {
        self()
    }
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> RunIdGenerator for UlidGenerator<C> {
    fn next_run_id(&self) -> RunId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        RunId::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

/// Hands out 1, 2, 3, ... in call order.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunIdGenerator for SequenceGenerator {
    fn next_run_id(&self) -> RunId {
        RunId::from_sequence(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
