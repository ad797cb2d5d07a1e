//! Active health checker.
//!
//! Periodically probes upstreams and updates their liveness flags. The
//! dispatcher only ever reads those flags.

use crate::config::{HealthCheckConfig, HealthCheckType};
use crate::metrics::MetricsCollector;
use crate::upstream::{HealthTarget, Liveness, Origin};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Active health checker that probes upstream origins.
pub struct HealthChecker {
    /// Upstreams whose liveness this checker owns.
    targets: Vec<HealthTarget>,
    /// Probe settings.
    config: HealthCheckConfig,
    /// Metrics collector.
    metrics: Option<MetricsCollector>,
}

impl HealthChecker {
    /// Create a new health checker.
    pub fn new(targets: Vec<HealthTarget>, config: HealthCheckConfig) -> Self {
        Self {
            targets,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the health checker until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.targets.is_empty() {
            info!("no health checks configured, health checker idle");
            let _ = shutdown.recv().await;
            return;
        }

        info!(
            upstreams = self.targets.len(),
            interval = ?self.config.interval,
            check = ?self.config.check_type,
            "health checker starting"
        );

        if let Some(metrics) = &self.metrics {
            for target in &self.targets {
                metrics.set_upstream_health(target.origin.as_str(), target.flag.is_alive());
            }
        }

        let mut check_interval = interval(self.config.interval);
        check_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = check_interval.tick() => {
                    for target in &self.targets {
                        let target = target.clone();
                        let config = self.config.clone();
                        let metrics = self.metrics.clone();

                        // Spawn check in background to not block other checks
                        tokio::spawn(async move {
                            check_once(&target, &config, metrics.as_ref()).await;
                        });
                    }
                }

                _ = shutdown.recv() => {
                    info!("health checker shutting down");
                    break;
                }
            }
        }
    }
}

/// Probe one upstream and feed the result into its flag.
pub async fn check_once(
    target: &HealthTarget,
    config: &HealthCheckConfig,
    metrics: Option<&MetricsCollector>,
) -> bool {
    let upstream = target.origin.as_str();
    let result = perform_health_check(&target.origin, config).await;
    let success = result.is_ok();

    match result {
        Ok(()) => {
            debug!(upstream = upstream, "health check passed");
            if target.flag.record_success() {
                info!(upstream = upstream, "upstream marked healthy");
            }
        }
        Err(e) => {
            warn!(upstream = upstream, error = %e, "health check failed");
            if target.flag.record_failure() {
                warn!(upstream = upstream, "upstream marked unhealthy");
            }
        }
    }

    if let Some(metrics) = metrics {
        metrics.record_health_check(upstream, success);
        metrics.set_upstream_health(upstream, target.flag.is_alive());
    }

    success
}

/// Perform a single health check on an upstream.
async fn perform_health_check(origin: &Origin, config: &HealthCheckConfig) -> Result<(), String> {
    match config.check_type {
        HealthCheckType::Tcp => tcp_health_check(origin, config.timeout).await,
        HealthCheckType::Http => {
            let path = config.path.as_deref().unwrap_or("/");
            http_health_check(origin, path, config.expected_status, config.timeout).await
        }
    }
}

async fn connect(origin: &Origin, check_timeout: Duration) -> Result<TcpStream, String> {
    match timeout(check_timeout, TcpStream::connect(origin.connect_target())).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(format!("connection failed: {}", e)),
        Err(_) => Err("connection timeout".to_string()),
    }
}

/// Perform a TCP health check (just connect).
async fn tcp_health_check(origin: &Origin, check_timeout: Duration) -> Result<(), String> {
    connect(origin, check_timeout).await.map(|_| ())
}

/// Perform an HTTP health check.
async fn http_health_check(
    origin: &Origin,
    path: &str,
    expected_status: u16,
    check_timeout: Duration,
) -> Result<(), String> {
    let mut stream = connect(origin, check_timeout).await?;

    let request = health_request(origin.authority().as_str(), path);
    let status = request_status(&mut stream, &request, check_timeout).await?;

    if status == expected_status {
        Ok(())
    } else {
        Err(format!(
            "unexpected status: {} (expected {})",
            status, expected_status
        ))
    }
}

fn health_request(authority: &str, path: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, authority
    )
}

/// Write `request` to `stream` and read back the response status code.
async fn request_status<S>(stream: &mut S, request: &str, check_timeout: Duration) -> Result<u16, String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = stream.write_all(request.as_bytes()).await {
        return Err(format!("write failed: {}", e));
    }

    // The status line is all we need.
    let mut buf = vec![0u8; 1024];
    let n = match timeout(check_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => n,
        Ok(Ok(_)) => return Err("empty response".to_string()),
        Ok(Err(e)) => return Err(format!("read failed: {}", e)),
        Err(_) => return Err("read timeout".to_string()),
    };

    parse_http_status(&String::from_utf8_lossy(&buf[..n]))
}

/// Parse HTTP status code from response.
fn parse_http_status(response: &str) -> Result<u16, String> {
    // Format: "HTTP/1.1 200 OK\r\n..."
    let mut parts = response.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => {
            code.parse().map_err(|_| "invalid status code".to_string())
        }
        _ => Err("invalid HTTP response".to_string()),
    }
}
