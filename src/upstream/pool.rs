//! Building the upstream pool from configuration.

use crate::config::{HealthCheckConfig, ProxyConfig, UpstreamConfig};
use crate::proxy::{HttpProxyConfig, HttpUpstream};
use crate::upstream::{AlwaysAlive, HealthFlag, Liveness, Origin, OriginError, Upstream};
use std::sync::Arc;
use tracing::debug;

/// An upstream whose liveness is driven by the health checker.
#[derive(Debug, Clone)]
pub struct HealthTarget {
    pub origin: Origin,
    pub flag: Arc<HealthFlag>,
}

/// The constructed pool, in configuration order, plus the health flags that
/// back it when active checking is enabled.
pub struct UpstreamSet {
    pub upstreams: Vec<Arc<dyn Upstream>>,
    pub health_targets: Vec<HealthTarget>,
}

/// Parse every configured upstream, failing on the first malformed address.
pub fn build_upstreams(
    upstreams: &[UpstreamConfig],
    proxy: &ProxyConfig,
    health_check: Option<&HealthCheckConfig>,
) -> Result<UpstreamSet, OriginError> {
    let proxy_config = HttpProxyConfig::from(proxy);
    let mut pool: Vec<Arc<dyn Upstream>> = Vec::with_capacity(upstreams.len());
    let mut health_targets = Vec::new();

    for upstream in upstreams {
        let origin = Origin::parse(&upstream.url)?;

        let liveness: Arc<dyn Liveness> = match health_check {
            Some(check) => {
                let flag = Arc::new(HealthFlag::new(
                    check.unhealthy_threshold,
                    check.healthy_threshold,
                ));
                health_targets.push(HealthTarget {
                    origin: origin.clone(),
                    flag: Arc::clone(&flag),
                });
                flag
            }
            None => Arc::new(AlwaysAlive),
        };

        debug!(upstream = %origin, checked = health_check.is_some(), "upstream configured");
        pool.push(Arc::new(HttpUpstream::new(
            origin,
            liveness,
            proxy_config.clone(),
        )));
    }

    Ok(UpstreamSet {
        upstreams: pool,
        health_targets,
    })
}
