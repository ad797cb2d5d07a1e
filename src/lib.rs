//! rrlb - a round-robin HTTP load balancer
//!
//! Every inbound request is forwarded to the next usable member of a fixed,
//! ordered pool of upstream origins:
//! - Round-robin rotation that skips upstreams reported as unavailable
//! - Bounded selection: an all-dead pool yields 503 instead of spinning
//! - Optional active health checking behind a pluggable liveness probe
//! - Prometheus metrics

pub mod config;
pub mod dispatch;
pub mod frontend;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod upstream;
pub mod util;

pub use config::Config;
pub use dispatch::{DispatchError, Dispatcher};
pub use upstream::Upstream;
