//! Health checking for upstream origins.

mod checker;

pub use checker::{check_once, HealthChecker};
