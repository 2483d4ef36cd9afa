use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, trace, warn};

use crate::error::ConnectionError;
use crate::http::parser::{ParseOutcome, RequestParser};
use crate::http::resolver::{Resolution, Resolver};
use crate::http::response::Response;
use crate::http::writer::{ResponseWriter, WriteProgress};
use crate::stats::ServerStats;

/// Stable reference to a connection slot. The generation changes every
/// time the slot is closed, so a handle outliving its connection no longer
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle {
    pub index: usize,
    pub generation: u32,
}

impl ConnHandle {
    /// Packs the handle into an epoll token.
    pub fn token(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64 & 0xffff_ffff)
    }

    pub fn from_token(token: u64) -> Self {
        Self {
            index: (token & 0xffff_ffff) as usize,
            generation: (token >> 32) as u32,
        }
    }
}

/// What the owner of a connection must do once it is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Re-arm for read readiness.
    Read,
    /// Re-arm for write readiness; a response is still pending.
    Write,
    /// A pipelined request is already buffered; run the parser again
    /// before waiting on the socket.
    Process,
    /// Tear the connection down.
    Close,
}

/// Per-socket state. Lives in a slot of the connection slab and is reused
/// across accepts.
pub struct Connection {
    index: usize,
    generation: u32,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    parser: RequestParser,
    writer: ResponseWriter,
    linger: bool,
    /// The peer shut down its sending side. Buffered bytes are still
    /// answered, then the connection closes.
    peer_closed: bool,
}

impl Connection {
    /// An empty slot. Buffers are allocated on the first accept.
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            generation: 0,
            stream: None,
            peer: None,
            parser: RequestParser::unallocated(),
            writer: ResponseWriter::unallocated(),
            linger: false,
            peer_closed: false,
        }
    }

    /// Takes ownership of a freshly accepted socket.
    pub fn init(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.parser.allocate();
        self.writer.allocate();
        self.stream = Some(stream);
        self.peer = Some(peer);
        self.peer_closed = false;
        self.parser.reset();
        self.writer.clear();
        self.linger = false;
    }

    /// Prepares a lingering connection for its next request. Bytes that
    /// arrived after the finished request stay buffered; returns whether
    /// there are any.
    fn next_request(&mut self) -> bool {
        self.writer.clear();
        self.linger = false;
        self.parser.next_request() > 0
    }

    pub fn handle(&self) -> ConnHandle {
        ConnHandle {
            index: self.index,
            generation: self.generation,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether `handle` still refers to this connection.
    pub fn matches(&self, handle: ConnHandle) -> bool {
        self.is_open() && self.generation == handle.generation
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Detaches the socket and advances the generation. The caller
    /// deregisters and drops the returned stream.
    pub fn retire(&mut self) -> Option<TcpStream> {
        let stream = self.stream.take()?;
        self.generation = self.generation.wrapping_add(1);
        self.peer = None;
        self.writer.clear();
        self.linger = false;
        self.peer_closed = false;
        Some(stream)
    }

    /// Reads until the socket would block. Edge-triggered readiness only
    /// fires on new arrivals, so anything left in the kernel buffer would
    /// otherwise go unnoticed.
    pub fn read(&mut self) -> Result<usize, ConnectionError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        if self.parser.is_full() {
            return Err(ConnectionError::Protocol("read buffer full"));
        }

        let mut total = 0;
        loop {
            let spare = self.parser.spare_capacity();
            if spare.is_empty() {
                break;
            }

            match (&*stream).read(spare) {
                // A request sent right before a half-close still gets
                // its response.
                Ok(0) if self.parser.read_index() > 0 => {
                    self.peer_closed = true;
                    break;
                }
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed connection",
                    )
                    .into());
                }
                Ok(n) => {
                    self.parser.commit(n);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!(conn = self.index, bytes = total, buffered = self.parser.read_index(), "Drained socket");
        Ok(total)
    }

    /// Worker entry point: parse what has been read, resolve a complete
    /// request, and start writing the response.
    pub fn process(&mut self, resolver: &Resolver, stats: &ServerStats) -> Interest {
        match self.parser.process_read() {
            ParseOutcome::NeedMoreData if self.peer_closed => {
                debug!(conn = self.index, "Peer closed before completing its request");
                Interest::Close
            }
            ParseOutcome::NeedMoreData => Interest::Read,
            ParseOutcome::MalformedRequest(reason) => {
                debug!(conn = self.index, peer = ?self.peer, reason, "Malformed request");
                stats.inc_protocol_error();
                self.respond(Response::bad_request(), false, stats)
            }
            ParseOutcome::InternalError => {
                warn!(conn = self.index, "Request parser reached an invalid state");
                self.respond(Response::internal_error(), false, stats)
            }
            ParseOutcome::CompleteRequest => match self.parser.request() {
                Some(request) => {
                    stats.inc_req();
                    let linger = request.linger;
                    let response = match resolver.resolve(&request) {
                        Resolution::FileRequest(file) => {
                            Response::file(file.contents, file.content_type)
                        }
                        Resolution::NoResource => {
                            let err = ConnectionError::Resource("not found");
                            trace!(conn = self.index, error = %err, path = %request.path, "Resource unavailable");
                            Response::not_found()
                        }
                        Resolution::ForbiddenRequest => {
                            let err = ConnectionError::Resource("forbidden");
                            trace!(conn = self.index, error = %err, path = %request.path, "Resource unavailable");
                            Response::forbidden()
                        }
                        Resolution::InternalError(e) => {
                            let err = ConnectionError::Internal(e);
                            warn!(conn = self.index, path = %request.path, error = %err, "Failed to resolve request");
                            return self.respond(Response::internal_error(), false, stats);
                        }
                    };

                    debug!(
                        conn = self.index,
                        method = ?request.method,
                        path = %request.path,
                        status = response.status.as_u16(),
                        linger,
                        "Request resolved"
                    );
                    self.respond(response, linger, stats)
                }
                None => self.respond(Response::internal_error(), false, stats),
            },
        }
    }

    /// Loads `response` into the write buffer and tries to send it.
    pub fn respond(&mut self, response: Response, linger: bool, stats: &ServerStats) -> Interest {
        let linger = linger && !self.peer_closed;
        self.linger = linger;
        if let Err(e) = self.writer.prepare(response.with_connection(linger)) {
            warn!(conn = self.index, error = %e, "Failed to prepare response");
            return Interest::Close;
        }
        self.flush(stats)
    }

    /// Sends pending response bytes. On completion a lingering connection
    /// moves on to its next request, which may already be buffered.
    pub fn flush(&mut self, stats: &ServerStats) -> Interest {
        let Some(stream) = self.stream.as_ref() else {
            return Interest::Close;
        };

        let before = self.writer.remaining();
        let progress = self.writer.write_to(&mut &*stream);
        stats.add_bytes(before - self.writer.remaining());

        match progress {
            Ok(WriteProgress::Complete) if self.linger => {
                if self.next_request() {
                    Interest::Process
                } else {
                    Interest::Read
                }
            }
            Ok(WriteProgress::Complete) => Interest::Close,
            Ok(WriteProgress::Pending) => Interest::Write,
            Err(e) => {
                debug!(conn = self.index, error = %e, "Write failed");
                Interest::Close
            }
        }
    }
}
