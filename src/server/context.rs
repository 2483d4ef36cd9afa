use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::MutexGuard;

use tracing::{debug, error, trace, warn};

use crate::error::ConnectionError;
use crate::http::connection::{ConnHandle, Connection, Interest};
use crate::http::resolver::Resolver;
use crate::http::response::Response;
use crate::http::writer::{WRITE_BUFFER_SIZE, serialize_head};
use crate::server::epoll::{Epoll, READ_INTEREST, WRITE_INTEREST};
use crate::server::slab::ConnectionSlab;
use crate::stats::{ServerStats, StatsSnapshot};

/// State shared by the reactor thread and every worker.
///
/// A connection is owned by exactly one of {reactor, pool queue, one
/// worker} at a time. One-shot registration guarantees no second event is
/// delivered before the owner re-arms, and the owner always re-arms after
/// releasing its slot guard.
pub struct ServerContext {
    epoll: Epoll,
    slab: ConnectionSlab,
    resolver: Resolver,
    stats: ServerStats,
    max_connections: usize,
    busy_response: Vec<u8>,
}

impl ServerContext {
    pub fn new(epoll: Epoll, resolver: Resolver, max_connections: usize) -> Self {
        Self {
            epoll,
            slab: ConnectionSlab::new(max_connections),
            resolver,
            stats: ServerStats::new(),
            max_connections,
            busy_response: busy_response(),
        }
    }

    pub fn epoll(&self) -> &Epoll {
        &self.epoll
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Initializes a slot for a freshly accepted socket and registers it
    /// for one-shot read readiness. Over capacity, the client gets a 503.
    pub fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(true) {
            debug!(%peer, error = %e, "Failed to make accepted socket non-blocking");
            return;
        }

        if self.stats.active_conns() >= self.max_connections {
            warn!(%peer, limit = self.max_connections, "Connection limit reached");
            self.reject_stream(&stream, ConnectionError::Capacity("connection limit reached"));
            return;
        }

        let Some(index) = self.slab.allocate() else {
            warn!(%peer, "No free connection slot");
            self.reject_stream(&stream, ConnectionError::Capacity("no free connection slot"));
            return;
        };

        let Some(mut conn) = self.slab.lock(index) else {
            return;
        };
        conn.init(stream, peer);
        self.stats.inc_conn();

        let handle = conn.handle();
        let Some(fd) = conn.raw_fd() else {
            return;
        };

        if let Err(e) = self.epoll.add(fd, handle.token(), READ_INTEREST) {
            error!(%peer, error = %e, "Failed to register connection");
            self.close(&mut conn);
            return;
        }

        debug!(conn = index, %peer, "Accepted connection");
    }

    /// Worker entry point for a connection taken off the queue.
    pub fn process(&self, handle: ConnHandle) {
        let mut conn = match self.slab.try_lock(handle.index) {
            Some(Ok(conn)) => conn,
            Some(Err(())) => {
                self.stats.inc_ownership_violation();
                error!(conn = handle.index, "Connection slot held by another thread");
                match self.slab.lock(handle.index) {
                    Some(conn) => conn,
                    None => return,
                }
            }
            None => return,
        };

        if !conn.matches(handle) {
            debug!(conn = handle.index, "Dropping stale connection handle");
            return;
        }

        let next = conn.process(&self.resolver, &self.stats);
        self.finish(handle, conn, next);
    }

    /// Reactor side of a readable event: drain the socket. Returns whether
    /// the connection should be handed to the pool.
    pub fn on_readable(&self, handle: ConnHandle) -> bool {
        let Some(mut conn) = self.slab.lock_handle(handle) else {
            return false;
        };

        match conn.read() {
            Ok(_) => true,
            Err(e) => {
                debug!(conn = handle.index, error = %e, "Closing connection after read");
                self.close(&mut conn);
                false
            }
        }
    }

    /// Reactor side of a writable event: continue the pending response.
    /// Returns whether a pipelined request is buffered and the connection
    /// should be handed to the pool.
    pub fn on_writable(&self, handle: ConnHandle) -> bool {
        let Some(mut conn) = self.slab.lock_handle(handle) else {
            return false;
        };
        match conn.flush(&self.stats) {
            Interest::Process => true,
            next => {
                self.finish(handle, conn, next);
                false
            }
        }
    }

    pub fn on_hangup(&self, handle: ConnHandle) {
        if let Some(mut conn) = self.slab.lock_handle(handle) {
            debug!(conn = handle.index, "Peer hung up");
            self.close(&mut conn);
        }
    }

    /// Sends a best-effort 503 and closes. Used when the pool queue is full.
    pub fn reject(&self, handle: ConnHandle) {
        if let Some(mut conn) = self.slab.lock_handle(handle) {
            if let Some(stream) = conn.retire() {
                self.reject_stream(&stream, ConnectionError::Capacity("request queue full"));
                self.deregister(&stream);
                self.slab.release(conn.index());
                self.stats.dec_conn();
            }
        }
    }

    /// Closes `handle` if it still refers to an open connection.
    pub fn close_handle(&self, handle: ConnHandle) {
        if let Some(mut conn) = self.slab.lock_handle(handle) {
            self.close(&mut conn);
        }
    }

    /// Closes every open connection. Only called once the workers are gone.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for index in 0..self.slab.capacity() {
            if let Some(mut conn) = self.slab.lock(index) {
                if conn.is_open() {
                    self.close(&mut conn);
                    closed += 1;
                }
            }
        }
        closed
    }

    /// Deregisters and closes the socket, then frees the slot.
    pub fn close(&self, conn: &mut Connection) {
        if let Some(stream) = conn.retire() {
            self.deregister(&stream);
            drop(stream);
            self.slab.release(conn.index());
            self.stats.dec_conn();
        }
    }

    /// Hands a connection back to the reactor: serve any pipelined
    /// requests, then re-arm the requested interest (after releasing the
    /// slot) or close it.
    fn finish(&self, handle: ConnHandle, mut conn: MutexGuard<'_, Connection>, next: Interest) {
        let mut next = next;
        let interest = loop {
            match next {
                Interest::Process => next = conn.process(&self.resolver, &self.stats),
                Interest::Close => {
                    self.close(&mut conn);
                    return;
                }
                Interest::Read => break READ_INTEREST,
                Interest::Write => break WRITE_INTEREST,
            }
        };

        let Some(fd) = conn.raw_fd() else {
            return;
        };
        drop(conn);

        if let Err(e) = self.epoll.modify(fd, handle.token(), interest) {
            warn!(conn = handle.index, error = %e, "Failed to re-arm connection");
            self.close_handle(handle);
        }
    }

    fn deregister(&self, stream: &TcpStream) {
        use std::os::fd::AsRawFd;

        if let Err(e) = self.epoll.delete(stream.as_raw_fd()) {
            debug!(error = %e, "Failed to deregister socket");
        }
    }

    fn reject_stream(&self, stream: &TcpStream, reason: ConnectionError) {
        debug!(error = %reason, "Answering 503");
        self.stats.inc_rejected();
        if let Err(e) = (&*stream).write_all(&self.busy_response) {
            trace!(error = %e, "503 response not fully sent");
        }
    }
}

/// Serialized `503 Service Unavailable` with `Connection: close`.
fn busy_response() -> Vec<u8> {
    let response = Response::service_unavailable().with_connection(false);
    let mut head = [0u8; WRITE_BUFFER_SIZE];
    let len = serialize_head(&response, &mut head).unwrap_or(0);

    let mut out = Vec::with_capacity(len + response.body.len());
    out.extend_from_slice(&head[..len]);
    out.extend_from_slice(&response.body);
    out
}
