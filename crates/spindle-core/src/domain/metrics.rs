//! Timing metrics shared by task runs and the pool itself.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Start/stop timestamps plus the derived runtime.
pub trait Metrics {
    fn started_at(&self) -> Option<DateTime<Utc>>;

    fn stopped_at(&self) -> Option<DateTime<Utc>>;

    /// `None` until both timestamps are set.
    fn runtime(&self) -> Option<Duration> {
        let started = self.started_at()?;
        let stopped = self.stopped_at()?;
        (stopped - started).to_std().ok()
    }
}

/// Pool-level start/stop pair. Fixed for good once stop completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

impl PoolMetrics {
    pub(crate) fn mark_started(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
    }

    /// The stop stamp never precedes the start stamp.
    pub(crate) fn mark_stopped(&mut self, at: DateTime<Utc>) {
        let at = match self.started_at {
            Some(started) => at.max(started),
            None => at,
        };
        self.stopped_at = Some(at);
    }
}

impl Metrics for PoolMetrics {
    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }
}
