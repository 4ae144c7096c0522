//! instrumental-agent: report this process's metrics to Instrumental.
//!
//! Samples CPU, memory and thread counts into a metric registry and
//! streams the registry to an Instrumental collector until interrupted.
//!
//! # Usage
//!
//! ```text
//! instrumental-agent --config instrumental.toml
//! instrumental-agent --token $INSTRUMENTAL_TOKEN --prefix myapp --interval 30s
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use instrumental_agent::config::{AgentConfig, Overrides};
use instrumental_agent::process::ProcessSampler;
use instrumental_metrics::Registry;
use instrumental_reporter::{Greeting, Reporter, ReporterConfig};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "instrumental-agent", version, about = "Report process metrics to Instrumental")]
struct Cli {
    /// Path to the TOML config file. Defaults to ./instrumental.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collector address as host:port.
    #[arg(long)]
    addr: Option<String>,

    /// Project token.
    #[arg(long, env = "INSTRUMENTAL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Prefix for every metric name.
    #[arg(long)]
    prefix: Option<String>,

    /// Report interval, e.g. "10s".
    #[arg(long)]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,instrumental_agent=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    config.apply(Overrides {
        addr: cli.addr,
        token: cli.token,
        prefix: cli.prefix,
        interval: cli.interval,
    });
    let reporter_config = config.reporter_config()?;
    let sample_interval = config.sample_interval()?;

    run(reporter_config, sample_interval).await
}

async fn run(reporter_config: ReporterConfig, sample_interval: Duration) -> anyhow::Result<()> {
    info!(addr = %reporter_config.addr, prefix = %reporter_config.prefix, "instrumental agent starting");

    let registry = Arc::new(Registry::new());
    let sampler = ProcessSampler::register(&registry)?;
    sampler.sample();

    let greeting = Greeting::detect()?;
    info!(hostname = %greeting.hostname, client = %greeting.client_id, "greeting prepared");

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sampler_handle = tokio::spawn(async move {
        sampler.run(sample_interval, shutdown_rx).await;
    });

    let reporter = Reporter::new(reporter_config, greeting, registry)?.spawn();

    // ── Shutdown ───────────────────────────────────────────────

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    reporter.shutdown().await;
    let _ = sampler_handle.await;

    info!("instrumental agent stopped");
    Ok(())
}
