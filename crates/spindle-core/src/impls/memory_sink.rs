//! MemoryEventSink - イベントをメモリに溜める（テスト用）

use std::sync::{Mutex, PoisonError};

use crate::domain::PoolEvent;
use crate::ports::EventSink;

/// Keeps every emitted event in order so tests can assert on them.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PoolEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count events matching `pred`.
    pub fn count(&self, pred: impl Fn(&PoolEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &PoolEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &PoolEvent) {}
}
