//! EventSink port - イベント記録の抽象化
//!
//! 直接 println/log を呼ばずに、PoolEvent をここへ流す。
//!
//! # 実装（impls）
//! - TracingEventSink: tracing に出力（デフォルト）
//! - MemoryEventSink: メモリに溜める（テスト用）
//! - NoopEventSink: 何もしない

use crate::domain::PoolEvent;

/// Receives every event a pool and its runners produce.
///
/// Called inline from worker loops, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PoolEvent);
}
