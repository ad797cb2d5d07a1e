//! Round-robin dispatcher over a fixed upstream pool.

use crate::metrics::MetricsCollector;
use crate::proxy::{error_response, ProxyBody, X_SERVED_BY};
use crate::upstream::Upstream;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors raised by the dispatcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("upstream pool is empty")]
    EmptyPool,

    #[error("all {0} upstreams are unavailable")]
    AllUnavailable(usize),
}

/// Picks the next usable upstream in rotation and forwards requests to it.
///
/// The rotation cursor only ever grows (wrapping on overflow) and is always
/// reduced modulo the pool size, so `cursor % len` is the successor of the
/// last upstream examined.
pub struct Dispatcher {
    pool: Vec<Arc<dyn Upstream>>,
    cursor: Mutex<usize>,
    metrics: Option<MetricsCollector>,
}

impl Dispatcher {
    /// Create a dispatcher over `pool`, in rotation order.
    pub fn new(pool: Vec<Arc<dyn Upstream>>) -> Result<Self, DispatchError> {
        if pool.is_empty() {
            return Err(DispatchError::EmptyPool);
        }

        Ok(Self {
            pool,
            cursor: Mutex::new(0),
            metrics: None,
        })
    }

    /// Record per-upstream request metrics through `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Always false; an empty pool is rejected by [`Dispatcher::new`].
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Choose the next usable upstream.
    ///
    /// Examines at most one full rotation. Every examined entry, including
    /// the returned one, advances the cursor by one step.
    pub fn select_next(&self) -> Result<Arc<dyn Upstream>, DispatchError> {
        let len = self.pool.len();
        let mut cursor = self.cursor.lock();

        for probe in 0..len {
            let index = cursor.wrapping_add(probe) % len;
            let upstream = &self.pool[index];

            if upstream.is_alive() {
                *cursor = cursor.wrapping_add(probe + 1);
                return Ok(Arc::clone(upstream));
            }

            debug!(upstream = upstream.address(), index, "skipping unavailable upstream");
        }

        *cursor = cursor.wrapping_add(len);
        Err(DispatchError::AllUnavailable(len))
    }

    /// Forward `req` to the next usable upstream and return the response to
    /// send back to the client.
    ///
    /// Answers 503 when no upstream is usable and 502/504 when forwarding
    /// fails. Never retries on another upstream.
    pub async fn dispatch(&self, req: Request<ProxyBody>) -> Response<ProxyBody> {
        let start = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();

        let upstream = match self.select_next() {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(method = %method, uri = %uri, error = %e, "no upstream available");
                if let Some(metrics) = &self.metrics {
                    metrics.record_unavailable();
                }
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "No upstream available");
            }
        };

        let address = upstream.address();
        info!(upstream = address, method = %method, uri = %uri, "forwarding request to upstream");

        let mut response = match upstream.forward(req).await {
            Ok(response) => response,
            Err(e) => {
                error!(upstream = address, method = %method, uri = %uri, error = %e, "forwarding failed");
                error_response(e.status(), &e.to_string())
            }
        };

        if let Ok(value) = HeaderValue::from_str(address) {
            response.headers_mut().insert(X_SERVED_BY, value);
        }

        let status = response.status().as_u16();
        let duration = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_request(address, method.as_str(), status, duration);
        }

        info!(
            upstream = address,
            method = %method,
            uri = %uri,
            status,
            duration_ms = duration.as_millis(),
            "proxied request completed"
        );

        response
    }

    #[cfg(test)]
    fn set_cursor(&self, value: usize) {
        *self.cursor.lock() = value;
    }

    #[cfg(test)]
    fn cursor(&self) -> usize {
        *self.cursor.lock()
    }
}
