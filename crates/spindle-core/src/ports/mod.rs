//! Ports - 抽象化レイヤー
//!
//! 時刻・ID 生成・イベント出力を trait として切り出し、テストで差し替えられるようにする。

pub mod clock;
pub mod event_sink;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{RunIdGenerator, SequenceGenerator, UlidGenerator};
