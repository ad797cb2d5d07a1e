//! HTTP forwarding to upstream origins.

mod headers;
mod http_proxy;

pub use headers::{add_forwarded_for, ensure_request_id, strip_hop_by_hop, X_REQUEST_ID, X_SERVED_BY};
pub use http_proxy::{HttpProxyConfig, HttpUpstream};

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::{Response, StatusCode};

/// Body type used for both proxied requests and responses.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// A body containing `chunk`.
pub fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// An empty body.
pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Create a plain-text error response.
pub fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full(format!("{}: {}\n", status, message)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_response() {
        let resp = error_response(StatusCode::BAD_GATEWAY, "test error");
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.headers()["content-type"], "text/plain");

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"502 Bad Gateway: test error\n");
    }

    #[tokio::test]
    async fn test_empty_body() {
        let body = empty().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }
}
