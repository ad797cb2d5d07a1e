//! Frontend listener implementation.
//!
//! Accepts incoming connections and hands every request to the dispatcher.

use crate::dispatch::Dispatcher;
use crate::metrics::MetricsCollector;
use crate::proxy::{add_forwarded_for, ensure_request_id};
use crate::util::RequestId;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Frontend listener that accepts and handles connections.
pub struct FrontendListener {
    /// Dispatcher shared by every connection.
    dispatcher: Arc<Dispatcher>,
    /// TCP listener.
    listener: TcpListener,
    /// Metrics collector.
    metrics: MetricsCollector,
}

impl FrontendListener {
    /// Create a new frontend listener.
    pub async fn bind(
        listen: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        metrics: MetricsCollector,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(listen).await?;

        info!(
            listen = %listener.local_addr()?,
            upstreams = dispatcher.len(),
            "frontend listener bound"
        );

        Ok(Self {
            dispatcher,
            listener,
            metrics,
        })
    }

    /// The address actually bound (useful when listening on port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting connections until shutdown.
    #[instrument(skip_all, fields(listen = ?self.listener.local_addr().ok()))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    /// Handle an incoming connection.
    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let metrics = self.metrics.clone();

        metrics.connection_opened();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let service = service_fn(move |req: Request<Incoming>| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    let mut req = req.map(|body| body.boxed());
                    let request_id = ensure_request_id(req.headers_mut(), RequestId::new().as_str());
                    add_forwarded_for(req.headers_mut(), client_addr.ip());

                    let span = info_span!("request", request_id = %request_id, client = %client_addr);

                    let response = dispatcher.dispatch(req).instrument(span).await;
                    Ok::<_, Infallible>(response)
                }
            });

            // Serve HTTP/1.1 with keep-alive support
            let result = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(TokioIo::new(stream), service)
                .await;

            metrics.connection_closed();

            let duration = start_time.elapsed();
            if let Err(e) = result {
                warn!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "connection handling failed"
                );
            } else {
                debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    "connection completed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{HttpProxyConfig, HttpUpstream};
    use crate::upstream::{AlwaysAlive, Upstream};

    #[tokio::test]
    async fn test_frontend_listener_bind() {
        let upstream: Arc<dyn Upstream> = Arc::new(
            HttpUpstream::from_url(
                "http://127.0.0.1:9000",
                Arc::new(AlwaysAlive),
                HttpProxyConfig::default(),
            )
            .unwrap(),
        );
        let dispatcher = Arc::new(Dispatcher::new(vec![upstream]).unwrap());

        let listener = FrontendListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            dispatcher,
            MetricsCollector::new(),
        )
        .await
        .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
