//! Frontend listener.
//!
//! Accepts client connections and routes every request through the
//! dispatcher; there is no path-based routing.

mod listener;

pub use listener::FrontendListener;
