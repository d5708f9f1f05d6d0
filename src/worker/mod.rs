//! The offline cache interceptor and the lifecycle machinery around it.
//!
//! - `Interceptor` holds the install / fetch / activate behaviour
//! - `Dispatcher` maps lifecycle event names to handlers and awaits them
//! - `WorkerHost` enforces install-before-activate and controls interception

mod dispatch;
mod host;
mod interceptor;
mod outcome;
#[cfg(test)]
mod testing;

pub use host::{WorkerHost, WorkerState};
pub use interceptor::{CacheSettings, Interceptor, DEFAULT_SWEEP_CONCURRENCY};
pub use outcome::SweepReport;
