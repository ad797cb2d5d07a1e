//! Upstream origin parsing.

use hyper::http::uri::{Authority, InvalidUri, Scheme};
use hyper::Uri;
use std::fmt;
use thiserror::Error;

/// Errors produced when an upstream address is not a usable origin.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("upstream address is empty")]
    Empty,

    #[error("invalid upstream URL '{url}': {source}")]
    InvalidUri {
        url: String,
        #[source]
        source: InvalidUri,
    },

    #[error("upstream URL '{0}' has no scheme (expected http://host[:port])")]
    MissingScheme(String),

    #[error("upstream URL '{url}' uses unsupported scheme '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("upstream URL '{0}' has no host")]
    MissingHost(String),

    #[error("upstream URL '{0}' must be an origin without path, query or fragment")]
    NotAnOrigin(String),
}

/// A parsed `http` origin: scheme plus host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    address: String,
    authority: Authority,
    host: String,
    port: u16,
}

impl Origin {
    /// Parse an origin from a URL such as `http://10.0.0.1:8080`.
    ///
    /// A single trailing `/` is accepted and dropped from the stored address.
    pub fn parse(url: &str) -> Result<Self, OriginError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(OriginError::Empty);
        }

        let uri: Uri = trimmed.parse().map_err(|source| OriginError::InvalidUri {
            url: trimmed.to_string(),
            source,
        })?;

        let scheme = uri
            .scheme()
            .ok_or_else(|| OriginError::MissingScheme(trimmed.to_string()))?;
        if *scheme != Scheme::HTTP {
            return Err(OriginError::UnsupportedScheme {
                url: trimmed.to_string(),
                scheme: scheme.to_string(),
            });
        }

        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| OriginError::MissingHost(trimmed.to_string()))?;
        if authority.host().is_empty() || authority.as_str().contains('@') {
            return Err(OriginError::MissingHost(trimmed.to_string()));
        }

        let has_path = !matches!(uri.path(), "" | "/");
        if has_path || uri.query().is_some() || trimmed.contains('#') {
            return Err(OriginError::NotAnOrigin(trimmed.to_string()));
        }

        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            address: trimmed.trim_end_matches('/').to_string(),
            host: authority.host().to_string(),
            authority,
            port,
        })
    }

    /// The origin as configured, without a trailing slash.
    pub fn as_str(&self) -> &str {
        &self.address
    }

    /// Host and optional port, as used in a `Host` header.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn connect_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
