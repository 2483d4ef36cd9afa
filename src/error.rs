//! Error types shared across the server.
//!
//! Connection-level failures never leave the connection boundary: the
//! reactor and the workers map each [`ConnectionError`] to a close (and
//! possibly an error response). Pool and server errors only surface at
//! startup, where they are fatal.

use std::io;

use thiserror::Error;

/// Why a single connection is being torn down or answered with an error.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Peer closed the socket, or a read/write failed.
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// The request could not be parsed.
    #[error("malformed request: {0}")]
    Protocol(&'static str),

    /// The requested resource is missing or not accessible.
    #[error("resource error: {0}")]
    Resource(&'static str),

    /// Too many connections, or the pending-request queue is full.
    #[error("server at capacity: {0}")]
    Capacity(&'static str),

    /// Resolver or state-machine failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while starting the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one thread")]
    NoThreads,

    #[error("worker pool queue capacity must be non-zero")]
    NoCapacity,

    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// A rejected submission. The item is handed back so the caller decides
/// what happens to it.
#[derive(Debug, Error)]
pub enum SubmitError<T> {
    #[error("pending-request queue is full")]
    QueueFull(T),

    #[error("worker pool is shutting down")]
    ShutDown(T),
}

impl<T> SubmitError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SubmitError::QueueFull(item) | SubmitError::ShutDown(item) => item,
        }
    }
}

/// Fatal server errors: socket setup, epoll, pool startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot serve from {path}: {source}")]
    Root {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("epoll failure: {0}")]
    Poll(#[source] io::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
