//! Upstream origins and their liveness.
//!
//! An [`Upstream`] is anything that can be addressed, checked and forwarded
//! to. The dispatcher depends on nothing else.

mod liveness;
mod origin;
mod pool;

pub use liveness::{AlwaysAlive, HealthFlag, Liveness};
pub use origin::{Origin, OriginError};
pub use pool::{build_upstreams, HealthTarget, UpstreamSet};

use crate::proxy::ProxyBody;
use futures::future::BoxFuture;
use hyper::{Request, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// A backend origin that can receive forwarded requests.
pub trait Upstream: Send + Sync {
    /// The origin identifier this upstream forwards to.
    fn address(&self) -> &str;

    /// Whether the upstream is currently usable.
    fn is_alive(&self) -> bool;

    /// Send `req` to the origin and return its response.
    ///
    /// Dropping the returned future cancels the upstream exchange.
    fn forward(
        &self,
        req: Request<ProxyBody>,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, ForwardError>>;
}

/// Transport-level failure while forwarding to an upstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to connect to upstream: {0}")]
    Connect(#[source] std::io::Error),

    #[error("timed out connecting to upstream after {0:?}")]
    ConnectTimeout(Duration),

    #[error("upstream handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("failed to send request to upstream: {0}")]
    Send(#[source] hyper::Error),

    #[error("upstream did not respond within {0:?}")]
    ResponseTimeout(Duration),
}

impl ForwardError {
    /// Status code reported to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::ConnectTimeout(_) | ForwardError::ResponseTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_error_status() {
        let refused = ForwardError::Connect(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(refused.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ForwardError::ConnectTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ForwardError::ResponseTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
