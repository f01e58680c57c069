//! Demo configuration read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use spindle_core::{FailurePolicy, PoolConfig};

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub pool: PoolConfig,
    /// How many demo tasks to submit.
    pub tasks: usize,
    /// Upper bound of the random sleep of each demo task.
    pub max_sleep: Duration,
}

impl DemoConfig {
    /// - SPINDLE_WORKERS (default 5)
    /// - SPINDLE_TASKS (default 100)
    /// - SPINDLE_MAX_SLEEP_MS (default 1000)
    /// - SPINDLE_TIMEOUT_MS (default 2000, 0 = no timeout)
    /// - SPINDLE_RAMP_UP_MS (default 1000)
    /// - SPINDLE_FAILURE_POLICY: exit | continue | restart (default exit)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let workers = parse(&lookup, "SPINDLE_WORKERS", 5usize)?;
        let timeout_ms = parse(&lookup, "SPINDLE_TIMEOUT_MS", 2000u64)?;
        let ramp_up_ms = parse(&lookup, "SPINDLE_RAMP_UP_MS", 1000u64)?;
        let failure_policy = match lookup("SPINDLE_FAILURE_POLICY").as_deref() {
            None | Some("exit") => FailurePolicy::ExitWorker,
            Some("continue") => FailurePolicy::Continue,
            Some("restart") => FailurePolicy::Restart,
            Some(other) => bail!("SPINDLE_FAILURE_POLICY: unknown policy {other:?}"),
        };

        let pool = PoolConfig {
            ramp_up: Duration::from_millis(ramp_up_ms),
            task_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            failure_policy,
            ..PoolConfig::new(workers)
        };
        pool.validate().context("invalid pool configuration")?;

        Ok(Self {
            pool,
            tasks: parse(&lookup, "SPINDLE_TASKS", 100usize)?,
            max_sleep: Duration::from_millis(parse(&lookup, "SPINDLE_MAX_SLEEP_MS", 1000u64)?),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key}: cannot parse {raw:?}")),
        None => Ok(default),
    }
}
