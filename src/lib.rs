//! Quay - a small static-file HTTP server.
//!
//! One reactor thread multiplexes every socket through edge-triggered,
//! one-shot epoll registrations. Readable connections are drained and
//! queued for a fixed pool of workers that parse the request, resolve it
//! against the served directory and start writing the response.

#[cfg(not(target_os = "linux"))]
compile_error!("quay requires Linux (epoll)");

pub mod config;
pub mod error;
pub mod http;
pub mod pool;
pub mod server;
pub mod stats;

pub use config::Config;
pub use error::{ConnectionError, PoolError, ServerError, ServerResult, SubmitError};
pub use server::{Server, ShutdownHandle, StatsHandle};
pub use stats::{ServerStats, StatsSnapshot};
