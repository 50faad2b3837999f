use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use bot_pool::config::PoolConfig;
use bot_pool::error::{self, TaskError};
use bot_pool::pool::{TaskProcessor, TracingObserver, WorkerPool, log_active, monitor};

/// Stand-in workload: sleeps for a random time and fails at a fixed rate.
struct SimulatedLookup {
    failure_rate: f64,
    min_ms: u64,
    max_ms: u64,
}

impl SimulatedLookup {
    fn from_settings(settings: &serde_json::Value) -> Self {
        let min_ms = settings["min_ms"].as_u64().unwrap_or(50);
        Self {
            failure_rate: settings["failure_rate"].as_f64().unwrap_or(0.1).clamp(0.0, 1.0),
            min_ms,
            max_ms: settings["max_ms"].as_u64().unwrap_or(250).max(min_ms + 1),
        }
    }
}

#[async_trait]
impl TaskProcessor for SimulatedLookup {
    type Task = String;
    type Output = String;

    async fn process(&self, task: &String) -> Result<String, TaskError> {
        let (delay, fail) = {
            let mut rng = rand::thread_rng();
            (
                Duration::from_millis(rng.gen_range(self.min_ms..self.max_ms)),
                rng.gen_bool(self.failure_rate),
            )
        };
        tokio::time::sleep(delay).await;

        if fail {
            Err(TaskError::Failed(format!("lookup for {task} was rejected")))
        } else {
            Ok(format!("{task}: ok in {}ms", delay.as_millis()))
        }
    }
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let config = match std::env::var("BOT_POOL_CONFIG") {
        Ok(path) => PoolConfig::from_file(path)?,
        Err(_) => PoolConfig::from_env()?,
    };

    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let task_count = config.processor["tasks"].as_u64().unwrap_or(20);
    let tasks: Vec<String> = (1..=task_count).map(|i| format!("PRI{i:04}")).collect();

    eprintln!("bot-pool v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Workers: {}", config.num_workers);
    eprintln!("   Tasks: {}", tasks.len());
    eprintln!("   Attempts per task: {}", config.max_retries.max(1));

    let processor = SimulatedLookup::from_settings(&config.processor);
    let pool = WorkerPool::new(&config, processor)?.with_observer(Arc::new(TracingObserver));

    let (report, polls) = tokio::join!(
        pool.execute(tasks),
        monitor(&pool, config.monitor_interval, log_active),
    );
    tracing::debug!(polls = polls?, "Monitor stopped");

    report.write_summary(std::io::stdout().lock())?;

    Ok(())
}
