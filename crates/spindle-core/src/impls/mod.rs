//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TracingEventSink**: tracing へのログ出力（デフォルト）
//! - **MemoryEventSink**: テスト用のイベント記録
//! - **NoopEventSink**: 何もしない

pub mod memory_sink;
pub mod tracing_sink;

pub use self::memory_sink::{MemoryEventSink, NoopEventSink};
pub use self::tracing_sink::TracingEventSink;
