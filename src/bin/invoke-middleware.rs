//! invoke-middleware — deadline-aware task invocation over HTTP.
//!
//! Endpoints:
//! - `POST /invoke` — submit a task
//! - `GET /status` — readiness (503 until startup finishes)
//! - `GET /tasks/{id}` — task record
//! - `GET /peek` — queued tasks in dispatch order

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use deadline_invoke::builders::build_process_scheduler;
use deadline_invoke::config::{load_dotenv, parse_policy, MiddlewareConfig};
use deadline_invoke::core::AppResult;
use deadline_invoke::runtime::{load_batch, start, Readiness, StartOptions, TokioSpawner};
use deadline_invoke::util::init_tracing;

// ── CLI ─────────────────────────────────────────────────────────────

/// Deadline-aware task invocation middleware.
#[derive(Parser, Debug)]
#[command(name = "invoke-middleware", version, about)]
struct Cli {
    /// JSON configuration file. Defaults apply when omitted.
    #[arg(long, env = "INVOKE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, `host:port`.
    #[arg(long)]
    bind: Option<String>,

    /// Number of execution slots.
    #[arg(long)]
    concurrency: Option<u32>,

    /// Admission policy: `best_effort` or `strict`.
    #[arg(long)]
    policy: Option<String>,

    /// Task batch (JSON array) submitted at startup.
    #[arg(long)]
    initial_batch: Option<PathBuf>,

    /// CSV performance log path.
    #[arg(long)]
    perf_log: Option<PathBuf>,

    /// Interpreter used to run scripts; empty runs them directly.
    #[arg(long)]
    interpreter: Option<String>,

    /// Base directory for relative script paths.
    #[arg(long)]
    script_root: Option<PathBuf>,
}

impl Cli {
    fn apply(self, cfg: &mut MiddlewareConfig) -> AppResult<()> {
        if let Some(bind) = self.bind {
            cfg.server.bind_addr = bind;
        }
        if let Some(n) = self.concurrency {
            cfg.scheduler.concurrency = n;
        }
        if let Some(policy) = self.policy {
            cfg.scheduler.admission_policy = parse_policy(&policy)?;
        }
        if let Some(interpreter) = self.interpreter {
            cfg.executor.interpreter = interpreter;
        }
        if self.script_root.is_some() {
            cfg.executor.script_root = self.script_root;
        }
        if self.initial_batch.is_some() {
            cfg.initial_batch = self.initial_batch;
        }
        if self.perf_log.is_some() {
            cfg.perf_log = self.perf_log;
        }
        cfg.validate()?;
        Ok(())
    }
}

fn load_config(cli: Cli) -> AppResult<MiddlewareConfig> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let cfg = MiddlewareConfig::from_file(path)?;
            info!(path = %path.display(), "loaded config");
            cfg
        }
        None => MiddlewareConfig::default(),
    };
    cfg.apply_env()?;
    cli.apply(&mut cfg)?;
    Ok(cfg)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> AppResult<()> {
    load_dotenv();
    init_tracing();

    let cfg = load_config(Cli::parse())?;
    let spawner = TokioSpawner::current().context("no tokio runtime")?;
    let scheduler = build_process_scheduler(&cfg, spawner)?;

    let initial_batch = match &cfg.initial_batch {
        Some(path) => {
            let batch = load_batch(path)?;
            info!(path = %path.display(), tasks = batch.len(), "loaded initial batch");
            batch
        }
        None => Vec::new(),
    };

    let listener = TcpListener::bind(&cfg.server.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind_addr))?;

    let handle = start(
        scheduler,
        listener,
        StartOptions {
            sweep_interval: cfg.scheduler.sweep_interval(),
            initial_batch,
            readiness: Readiness::new(),
        },
    )
    .await?;
    info!(url = %handle.base_url(), "invoke-middleware started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
    }
    info!("shutting down");
    tokio::time::timeout(Duration::from_secs(10), handle.shutdown())
        .await
        .context("shutdown timed out")??;
    info!("invoke-middleware exited cleanly");
    Ok(())
}
