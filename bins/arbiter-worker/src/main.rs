mod consumer;
mod orchestrator;
#[cfg(test)]
mod orchestrator_tests;

use std::sync::Arc;

use arbiter_common::config::Config;
use arbiter_common::queue::JobQueue;
use arbiter_common::store::RedisStore;
use arbiter_engine::harness::ScratchHarness;
use tokio::signal;
use tracing::{info, warn};

use orchestrator::JudgeOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Arbiter worker booting...");

    let config = Config::from_env();
    tokio::fs::create_dir_all(&config.scratch_dir).await?;
    info!(scratch = %config.scratch_dir.display(), "Scratch directory ready");

    let store = RedisStore::connect(&config.redis_url).await?;
    info!("Connected to Redis: {}", config.redis_url);

    // Each slot owns its queue connection; blocking fetches never contend.
    let mut slots = Vec::with_capacity(config.worker_slots);
    for slot in 0..config.worker_slots {
        let queue = JobQueue::connect(&config.redis_url).await?;
        let store = store.clone();
        let orchestrator = JudgeOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(ScratchHarness::new(config.scratch_dir.clone())),
        );
        slots.push(tokio::spawn(consumer::consume(queue, orchestrator, slot)));
    }
    info!(slots = config.worker_slots, "Consumer slots running");

    signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    warn!("Received shutdown signal, stopping consumers...");

    // In-flight messages stay on the processing list and are re-judged
    // after a restart; the verdict write is idempotent.
    for handle in &slots {
        handle.abort();
    }

    info!("Worker shutdown complete");
    Ok(())
}
