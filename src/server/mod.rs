//! Socket setup, the epoll reactor, and the shared connection table.

pub mod context;
pub mod epoll;
pub mod listener;
pub mod reactor;
pub mod slab;

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::http::connection::ConnHandle;
use crate::http::resolver::Resolver;
use crate::pool::WorkerPool;
use crate::stats::StatsSnapshot;
use context::ServerContext;
use epoll::Epoll;
use reactor::Reactor;

/// A bound, ready-to-run server.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    shutdown: Arc<AtomicBool>,
    workers: usize,
    queue_capacity: usize,
    max_events: usize,
}

/// Requests a graceful stop from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// The reactor notices within one wait timeout.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Read-only view of a running server's counters.
#[derive(Clone)]
pub struct StatsHandle {
    ctx: Arc<ServerContext>,
}

impl StatsHandle {
    pub fn snapshot(&self) -> StatsSnapshot {
        self.ctx.stats()
    }
}

impl Server {
    /// Binds the listener and prepares the reactor state. Nothing is
    /// accepted until [`Server::run`].
    pub fn bind(cfg: &Config) -> ServerResult<Self> {
        let root = &cfg.static_files.root;
        let resolver =
            Resolver::new(root, cfg.static_files.index.clone()).map_err(|source| {
                ServerError::Root {
                    path: root.display().to_string(),
                    source,
                }
            })?;

        info!(root = %resolver.root().display(), "Serving static files");

        let listener = listener::bind(&cfg.server.listen_addr)?;
        let epoll = Epoll::new().map_err(ServerError::Poll)?;
        let ctx = Arc::new(ServerContext::new(
            epoll,
            resolver,
            cfg.server.max_connections,
        ));

        Ok(Self {
            listener,
            ctx,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: cfg.server.workers,
            queue_capacity: cfg.server.queue_capacity,
            max_events: cfg.server.max_events,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            ctx: Arc::clone(&self.ctx),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats()
    }

    /// Starts the workers and runs the reactor on the calling thread until
    /// shutdown is requested.
    pub fn run(self) -> ServerResult<()> {
        let worker_ctx = Arc::clone(&self.ctx);
        let pool = WorkerPool::start(self.workers, self.queue_capacity, move |handle: ConnHandle| {
            worker_ctx.process(handle)
        })?;

        let reactor = Reactor::new(
            self.listener,
            Arc::clone(&self.ctx),
            pool,
            Arc::clone(&self.shutdown),
            self.max_events,
        )?;
        let result = reactor.run();

        let stats = self.ctx.stats();
        info!(
            accepted = stats.accepted,
            requests = stats.requests,
            rejected = stats.rejected,
            protocol_errors = stats.protocol_errors,
            bytes_sent = stats.bytes_sent,
            "Server stopped"
        );
        result
    }
}
