use std::io;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult, SubmitError};
use crate::http::connection::ConnHandle;
use crate::pool::WorkerPool;
use crate::server::context::ServerContext;
use crate::server::epoll::{
    EV_HANGUP, EV_READ_HANGUP, EV_READABLE, EV_WRITABLE, LISTEN_INTEREST, epoll_event,
    event_buffer,
};

/// Token reserved for the listening socket. Connection tokens carry a slab
/// index in the low 32 bits, so they never reach this value.
pub const LISTENER_TOKEN: u64 = u64::MAX;

/// Upper bound on how long a wait blocks before the shutdown flag is
/// checked again.
const WAIT_TIMEOUT_MS: i32 = 200;

/// The single event-dispatch thread: accepts, drains readable sockets,
/// continues pending writes, and hands parsed work to the pool.
pub struct Reactor {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    pool: WorkerPool<ConnHandle>,
    shutdown: Arc<AtomicBool>,
    events: Vec<epoll_event>,
}

impl Reactor {
    pub fn new(
        listener: TcpListener,
        ctx: Arc<ServerContext>,
        pool: WorkerPool<ConnHandle>,
        shutdown: Arc<AtomicBool>,
        max_events: usize,
    ) -> ServerResult<Self> {
        let reactor = Self {
            listener,
            ctx,
            pool,
            shutdown,
            events: event_buffer(max_events),
        };
        reactor.register_listener()?;
        Ok(reactor)
    }

    /// Edge-triggered read interest, never one-shot: the listener is only
    /// ever touched by this thread.
    fn register_listener(&self) -> ServerResult<()> {
        self.ctx
            .epoll()
            .add(self.listener.as_raw_fd(), LISTENER_TOKEN, LISTEN_INTEREST)
            .map_err(ServerError::Poll)
    }

    /// Runs until the shutdown flag is raised, then stops the pool and
    /// closes every remaining connection.
    pub fn run(mut self) -> ServerResult<()> {
        let result = self.event_loop();
        self.teardown();
        result
    }

    fn event_loop(&mut self) -> ServerResult<()> {
        while !self.shutdown.load(Ordering::Acquire) {
            let n = self
                .ctx
                .epoll()
                .wait(&mut self.events, WAIT_TIMEOUT_MS)
                .map_err(ServerError::Poll)?;

            for event in self.events[..n].iter().copied() {
                let token = event.u64;
                let flags = event.events;
                self.dispatch(token, flags);
            }
        }

        info!("Reactor stopping");
        Ok(())
    }

    fn dispatch(&self, token: u64, flags: u32) {
        if token == LISTENER_TOKEN {
            self.accept_all();
            return;
        }

        let handle = ConnHandle::from_token(token);

        if flags & EV_HANGUP != 0 {
            self.ctx.on_hangup(handle);
        } else if flags & (EV_READABLE | EV_READ_HANGUP) != 0 {
            // A read hang-up alone still drains: the peer may have sent a
            // request before shutting down its side.
            if self.ctx.on_readable(handle) {
                self.submit(handle);
            }
        } else if flags & EV_WRITABLE != 0 {
            if self.ctx.on_writable(handle) {
                self.submit(handle);
            }
        } else {
            debug!(conn = handle.index, flags, "Ignoring unexpected event");
        }
    }

    /// The listener is edge-triggered, so accept until it would block.
    fn accept_all(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.ctx.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EMFILE and friends: the pending connection stays in
                    // the backlog until the next edge.
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn submit(&self, handle: ConnHandle) {
        match self.pool.submit(handle) {
            Ok(()) => {}
            Err(SubmitError::QueueFull(handle)) => {
                warn!(conn = handle.index, "Request queue full, rejecting connection");
                self.ctx.reject(handle);
            }
            Err(SubmitError::ShutDown(handle)) => self.ctx.close_handle(handle),
        }
    }

    fn teardown(&mut self) {
        if let Err(e) = self.ctx.epoll().delete(self.listener.as_raw_fd()) {
            error!(error = %e, "Failed to deregister listener");
        }

        for handle in self.pool.shutdown() {
            self.ctx.close_handle(handle);
        }

        let closed = self.ctx.close_all();
        if closed > 0 {
            info!(closed, "Closed remaining connections");
        }
    }
}
