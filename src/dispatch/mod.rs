//! Request dispatch: round-robin selection over the upstream pool.

mod dispatcher;

pub use dispatcher::{DispatchError, Dispatcher};
