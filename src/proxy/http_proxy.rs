//! HTTP proxy implementation.
//!
//! Forwards a single HTTP/1.1 request to one upstream origin.

use crate::config::ProxyConfig;
use crate::proxy::{strip_hop_by_hop, ProxyBody};
use crate::upstream::{ForwardError, Liveness, Origin, OriginError, Upstream};
use futures::future::BoxFuture;
use futures::FutureExt;
use http_body_util::BodyExt;
use hyper::header::{HeaderValue, HOST};
use hyper::http::uri::PathAndQuery;
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// HTTP proxy configuration.
#[derive(Debug, Clone)]
pub struct HttpProxyConfig {
    /// Connect timeout for the upstream.
    pub connect_timeout: Duration,
    /// Time allowed for the upstream to send its response head.
    pub request_timeout: Duration,
}

impl Default for HttpProxyConfig {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for HttpProxyConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        }
    }
}

/// An upstream reached over plain HTTP/1.1.
pub struct HttpUpstream {
    origin: Origin,
    liveness: Arc<dyn Liveness>,
    config: HttpProxyConfig,
}

impl HttpUpstream {
    pub fn new(origin: Origin, liveness: Arc<dyn Liveness>, config: HttpProxyConfig) -> Self {
        Self {
            origin,
            liveness,
            config,
        }
    }

    /// Parse `url` and build an upstream; malformed addresses fail here rather
    /// than on the first forwarded request.
    pub fn from_url(
        url: &str,
        liveness: Arc<dyn Liveness>,
        config: HttpProxyConfig,
    ) -> Result<Self, OriginError> {
        Ok(Self::new(Origin::parse(url)?, liveness, config))
    }

    async fn send(&self, mut req: Request<ProxyBody>) -> Result<Response<ProxyBody>, ForwardError> {
        let connect_timeout = self.config.connect_timeout;
        let stream = match timeout(connect_timeout, TcpStream::connect(self.origin.connect_target())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ForwardError::Connect(e)),
            Err(_) => return Err(ForwardError::ConnectTimeout(connect_timeout)),
        };
        let _ = stream.set_nodelay(true);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ForwardError::Handshake)?;

        // The connection ends once the sender and response body are dropped.
        let upstream = self.origin.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(upstream = %upstream, error = %e, "upstream connection error");
            }
        });

        self.rewrite_request(&mut req);

        let request_timeout = self.config.request_timeout;
        let response = match timeout(request_timeout, sender.send_request(req)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ForwardError::Send(e)),
            Err(_) => return Err(ForwardError::ResponseTimeout(request_timeout)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        debug!(upstream = %self.origin, status = parts.status.as_u16(), "upstream responded");
        Ok(Response::from_parts(parts, body.boxed()))
    }

    /// Turn the inbound request into one addressed to this origin.
    fn rewrite_request(&self, req: &mut Request<ProxyBody>) {
        let path_and_query = req
            .uri()
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        *req.uri_mut() = Uri::from(path_and_query);

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);

        if !headers.contains_key(HOST) {
            if let Ok(value) = HeaderValue::from_str(self.origin.authority().as_str()) {
                headers.insert(HOST, value);
            }
        }
    }
}

impl Upstream for HttpUpstream {
    fn address(&self) -> &str {
        self.origin.as_str()
    }

    fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    fn forward(
        &self,
        req: Request<ProxyBody>,
    ) -> BoxFuture<'_, Result<Response<ProxyBody>, ForwardError>> {
        self.send(req).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{empty, full};
    use crate::upstream::{AlwaysAlive, HealthFlag};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::StatusCode;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve requests by echoing the request target and Host header.
    async fn start_echo_origin() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                        let host = req
                            .headers()
                            .get(HOST)
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let hop = req.headers().contains_key("keep-alive");
                        let body = format!("{} {} host={} hop={}", req.method(), req.uri(), host, hop);
                        Ok::<_, Infallible>(
                            Response::builder()
                                .header("connection", "keep-alive")
                                .header("x-origin", "echo")
                                .body(full(body))
                                .unwrap(),
                        )
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        addr
    }

    fn upstream_for(addr: SocketAddr, config: HttpProxyConfig) -> HttpUpstream {
        HttpUpstream::from_url(&format!("http://{}", addr), Arc::new(AlwaysAlive), config).unwrap()
    }

    #[test]
    fn test_from_url_rejects_malformed_address() {
        let result = HttpUpstream::from_url("::bad::", Arc::new(AlwaysAlive), HttpProxyConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_liveness_is_delegated() {
        let flag = Arc::new(HealthFlag::default());
        let upstream = HttpUpstream::from_url(
            "http://127.0.0.1:9001",
            flag.clone(),
            HttpProxyConfig::default(),
        )
        .unwrap();

        assert_eq!(upstream.address(), "http://127.0.0.1:9001");
        assert!(upstream.is_alive());
        flag.set_alive(false);
        assert!(!upstream.is_alive());
    }

    #[tokio::test]
    async fn test_forward_rewrites_to_origin_form() {
        let addr = start_echo_origin().await;
        let upstream = upstream_for(addr, HttpProxyConfig::default());

        let req = Request::builder()
            .method("GET")
            .uri("http://lb.example.com/ping?x=1")
            .header(HOST, "lb.example.com")
            .header("keep-alive", "timeout=5")
            .body(empty())
            .unwrap();

        let resp = upstream.forward(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-origin"], "echo");
        assert!(resp.headers().get("connection").is_none());

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"GET /ping?x=1 host=lb.example.com hop=false");
    }

    #[tokio::test]
    async fn test_forward_sets_host_when_missing() {
        let addr = start_echo_origin().await;
        let upstream = upstream_for(addr, HttpProxyConfig::default());

        let req = Request::builder().uri("/").body(empty()).unwrap();
        let resp = upstream.forward(req).await.unwrap();

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let expected = format!("GET / host={} hop=false", addr);
        assert_eq!(&body[..], expected.as_bytes());
    }

    #[tokio::test]
    async fn test_forward_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = upstream_for(addr, HttpProxyConfig::default());
        let req = Request::builder().uri("/").body(empty()).unwrap();

        let Err(err) = upstream.forward(req).await else {
            panic!("forward should fail");
        };
        assert!(matches!(err, ForwardError::Connect(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_forward_upstream_closes_without_response() {
        // Reads the request, then hangs up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
            }
        });

        let upstream = upstream_for(addr, HttpProxyConfig::default());
        let req = Request::builder().uri("/").body(empty()).unwrap();

        let Err(err) = upstream.forward(req).await else {
            panic!("forward should fail");
        };
        assert!(matches!(err, ForwardError::Send(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_forward_response_timeout() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = HttpProxyConfig {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_millis(100),
        };
        let upstream = upstream_for(addr, config);
        let req = Request::builder().uri("/slow").body(empty()).unwrap();

        let Err(err) = upstream.forward(req).await else {
            panic!("forward should fail");
        };
        assert!(matches!(err, ForwardError::ResponseTimeout(_)));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
