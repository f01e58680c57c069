use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use spindle_core::{PoolBuilder, PoolReport};
use tracing_subscriber::EnvFilter;

mod config;

use config::DemoConfig;

/// デモ用タスク: 0..max_sleep のランダムな時間だけ眠って成功する
fn do_something(max_sleep: Duration) -> Result<(), spindle_core::domain::BoxError> {
    let millis = max_sleep.as_millis() as u64;
    let pause = if millis == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    };
    std::thread::sleep(pause);
    tracing::info!(?pause, "doing something");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG で制御（デフォルト info）
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DemoConfig::from_env()?;
    tracing::info!(
        workers = config.pool.workers,
        tasks = config.tasks,
        timeout = ?config.pool.task_timeout,
        policy = ?config.pool.failure_policy,
        "starting spindle demo"
    );

    let pool = PoolBuilder::from_config(config.pool).build()?;
    pool.start()?;

    for _ in 0..config.tasks {
        let max_sleep = config.max_sleep;
        if let Err(e) = pool.submit(move || do_something(max_sleep)).await {
            // 全ワーカーが落ちるとキューが閉じる
            tracing::warn!(error = %e, "submission stopped");
            break;
        }
    }

    let report: PoolReport = pool.stop().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize pool report")?
    );
    Ok(())
}
