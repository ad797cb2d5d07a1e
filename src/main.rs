//! rrlb - a round-robin HTTP load balancer
//!
//! Usage:
//!     rrlb --config <path>
//!     rrlb --port 8080 --upstream http://10.0.0.1:8000 --upstream http://10.0.0.2:8000
//!     rrlb --config <path> --no-metrics
//!
//! See --help for more options.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use rrlb::config::{load_config, validate_config, Config, UpstreamConfig};
use rrlb::dispatch::Dispatcher;
use rrlb::frontend::FrontendListener;
use rrlb::health::HealthChecker;
use rrlb::metrics::{MetricsCollector, MetricsServer};
use rrlb::upstream::build_upstreams;
use rrlb::util::{init_logging, ShutdownSignal};

/// A round-robin HTTP load balancer.
#[derive(Parser, Debug)]
#[command(name = "rrlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configured listen port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream origin URL; repeat for each upstream, in rotation order
    #[arg(short, long = "upstream", value_name = "URL")]
    upstreams: Vec<String>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Disable the metrics endpoint
    #[arg(long)]
    no_metrics: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

impl Cli {
    /// Build the effective configuration: file first, then flag overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path).with_context(|| {
                format!("failed to load configuration from '{}'", path.display())
            })?,
            None if self.upstreams.is_empty() => {
                bail!("no upstreams given: pass --config <FILE> or at least one --upstream <URL>")
            }
            None => {
                // Flags-only runs expose no metrics unless a config file asks for them.
                let mut config = Config::default();
                config.global.metrics.enabled = false;
                config
            }
        };

        if let Some(port) = self.port {
            config.listen = SocketAddr::new(config.listen.ip(), port);
        }
        if !self.upstreams.is_empty() {
            config.upstreams = self.upstreams.iter().map(UpstreamConfig::new).collect();
        }
        if let Some(level) = &self.log_level {
            config.global.log_level = level.clone();
        }
        if self.no_metrics {
            config.global.metrics.enabled = false;
        }

        validate_config(&config)
            .map_err(anyhow::Error::msg)
            .context("invalid configuration")?;

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    init_logging(&config.global.log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.listen);
        if config.global.metrics.enabled {
            println!("  Metrics: {}{}", config.global.metrics.address, config.global.metrics.path);
        }
        println!("  Upstreams: {}", config.upstreams.len());
        for upstream in &config.upstreams {
            println!("    - {}", upstream.url);
        }
        return Ok(());
    }

    info!(
        config_path = ?cli.config,
        listen = %config.listen,
        upstreams = config.upstreams.len(),
        health_check = config.health_check.is_some(),
        "rrlb starting"
    );

    run(config)
}

/// Run the load balancer with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the load balancer.
async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let metrics = MetricsCollector::new();

    let upstream_set = build_upstreams(
        &config.upstreams,
        &config.proxy,
        config.health_check.as_ref(),
    )
    .context("failed to build upstream pool")?;

    for upstream in &upstream_set.upstreams {
        info!(upstream = upstream.address(), "configured upstream");
    }

    let dispatcher = Arc::new(
        Dispatcher::new(upstream_set.upstreams)
            .context("failed to create dispatcher")?
            .with_metrics(metrics.clone()),
    );

    let mut handles = Vec::new();

    if config.global.metrics.enabled {
        let server = MetricsServer::bind(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            metrics.clone(),
        )
        .await
        .with_context(|| {
            format!(
                "failed to bind metrics server on {}",
                config.global.metrics.address
            )
        })?;
        handles.push(tokio::spawn(server.run(shutdown.subscribe())));
    }

    if let Some(check) = config.health_check.clone() {
        let checker =
            HealthChecker::new(upstream_set.health_targets, check).with_metrics(metrics.clone());
        handles.push(tokio::spawn(checker.run(shutdown.subscribe())));
    }

    let listener = FrontendListener::bind(config.listen, Arc::clone(&dispatcher), metrics)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen))?;

    println!("listening at {}", listener.local_addr()?);
    handles.push(tokio::spawn(listener.run(shutdown.subscribe())));

    info!("rrlb is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    shutdown.shutdown();

    for handle in handles {
        let _ = handle.await;
    }

    info!("rrlb shut down complete");
    Ok(())
}
