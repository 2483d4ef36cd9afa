//! Incremental HTTP/1.1 request parser.
//!
//! Two coupled state machines work on one fixed-size read buffer:
//!
//! - the line splitter ([`RequestParser::parse_line`]) finds `CR LF`
//!   terminators between `checked_index` and `read_index` and overwrites
//!   them with NUL bytes in place;
//! - the main machine ([`RequestParser::process_read`]) interprets each
//!   complete line according to the current [`CheckState`].
//!
//! Bytes may arrive in any number of reads. Whenever the splitter runs out
//! of data the parser reports [`ParseOutcome::NeedMoreData`] and resumes
//! from the same cursors after the next read.

use crate::http::request::{Method, Request};

/// Capacity of a connection's read buffer.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Result of one run of the line splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A complete line was found.
    Ok,
    /// A line terminator is malformed.
    Bad,
    /// No complete line yet; more bytes are needed.
    Open,
}

/// State of the main state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Headers,
    Body,
}

/// Outcome of driving the main state machine over the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    NeedMoreData,
    CompleteRequest,
    MalformedRequest(&'static str),
    InternalError,
}

#[derive(Debug)]
struct RequestLine {
    method: Method,
    target: String,
    version: String,
    authority: Option<String>,
}

#[derive(Debug)]
enum HeaderLine {
    End,
    Host(String),
    Connection { keep_alive: bool },
    ContentLength(usize),
    Other,
}

pub struct RequestParser {
    buf: Box<[u8]>,
    read_index: usize,
    checked_index: usize,
    start_line: usize,
    state: CheckState,
    complete: bool,

    method: Option<Method>,
    url: Option<String>,
    version: Option<String>,
    host: Option<String>,
    linger: bool,
    content_length: Option<usize>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser with its read buffer allocated.
    pub fn new() -> Self {
        let mut parser = Self::unallocated();
        parser.allocate();
        parser
    }

    /// Creates a parser without a buffer. Connection slots start out this
    /// way and allocate on their first accept.
    pub fn unallocated() -> Self {
        Self {
            buf: Box::default(),
            read_index: 0,
            checked_index: 0,
            start_line: 0,
            state: CheckState::RequestLine,
            complete: false,
            method: None,
            url: None,
            version: None,
            host: None,
            linger: false,
            content_length: None,
        }
    }

    pub fn allocate(&mut self) {
        if self.buf.is_empty() {
            self.buf = vec![0u8; READ_BUFFER_SIZE].into_boxed_slice();
        }
    }

    /// Forgets the current request and rewinds every cursor.
    pub fn reset(&mut self) {
        self.buf[..self.read_index].fill(0);
        self.read_index = 0;
        self.clear_request();
    }

    /// Drops the request just completed and keeps whatever arrived after
    /// it, moved to the front of the buffer. Returns how many bytes of the
    /// next request are already buffered.
    pub fn next_request(&mut self) -> usize {
        if !self.complete {
            self.reset();
            return 0;
        }

        let consumed = self.checked_index.min(self.read_index);
        let pending = self.read_index - consumed;
        self.buf.copy_within(consumed..self.read_index, 0);
        self.buf[pending..self.read_index].fill(0);
        self.read_index = pending;
        self.clear_request();
        pending
    }

    fn clear_request(&mut self) {
        self.checked_index = 0;
        self.start_line = 0;
        self.state = CheckState::RequestLine;
        self.complete = false;
        self.method = None;
        self.url = None;
        self.version = None;
        self.host = None;
        self.linger = false;
        self.content_length = None;
    }

    /// The unfilled tail of the read buffer.
    pub fn spare_capacity(&mut self) -> &mut [u8] {
        &mut self.buf[self.read_index..]
    }

    /// Marks `n` bytes of [`spare_capacity`](Self::spare_capacity) as filled.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.read_index + n <= self.buf.len());
        self.read_index = (self.read_index + n).min(self.buf.len());
    }

    /// Copies as much of `bytes` as fits into the buffer and returns how
    /// many bytes were taken.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare_capacity();
        let n = bytes.len().min(spare.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.commit(n);
        n
    }

    pub fn is_full(&self) -> bool {
        self.read_index == self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn checked_index(&self) -> usize {
        self.checked_index
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn linger(&self) -> bool {
        self.linger
    }

    /// Line splitter. Scans from `checked_index` to `read_index`; on a
    /// complete line both terminator bytes are zeroed and `checked_index`
    /// moves past them.
    pub fn parse_line(&mut self) -> LineStatus {
        while self.checked_index < self.read_index {
            match self.buf[self.checked_index] {
                b'\r' => {
                    if self.checked_index + 1 == self.read_index {
                        return LineStatus::Open;
                    }
                    if self.buf[self.checked_index + 1] == b'\n' {
                        self.buf[self.checked_index] = 0;
                        self.buf[self.checked_index + 1] = 0;
                        self.checked_index += 2;
                        return LineStatus::Ok;
                    }
                    return LineStatus::Bad;
                }
                b'\n' => {
                    if self.checked_index > 0 && self.buf[self.checked_index - 1] == b'\r' {
                        self.buf[self.checked_index - 1] = 0;
                        self.buf[self.checked_index] = 0;
                        self.checked_index += 1;
                        return LineStatus::Ok;
                    }
                    return LineStatus::Bad;
                }
                _ => self.checked_index += 1,
            }
        }
        LineStatus::Open
    }

    /// Returns the line just completed by [`parse_line`](Self::parse_line)
    /// (without its terminator) and moves `start_line` to the next one.
    pub fn take_line(&mut self) -> &[u8] {
        let start = self.start_line;
        let end = self.checked_index.saturating_sub(2).max(start);
        self.start_line = self.checked_index;
        &self.buf[start..end]
    }

    /// Drives the main state machine over everything buffered so far.
    pub fn process_read(&mut self) -> ParseOutcome {
        if self.complete {
            return ParseOutcome::CompleteRequest;
        }

        loop {
            if self.start_line > self.checked_index || self.checked_index > self.read_index {
                return ParseOutcome::InternalError;
            }

            if self.state == CheckState::Body {
                return self.parse_content();
            }

            match self.parse_line() {
                LineStatus::Ok => {}
                LineStatus::Bad => return ParseOutcome::MalformedRequest("bad line terminator"),
                LineStatus::Open if self.is_full() => {
                    return ParseOutcome::MalformedRequest("request exceeds read buffer");
                }
                LineStatus::Open => return ParseOutcome::NeedMoreData,
            }

            match self.state {
                CheckState::RequestLine => {
                    let parsed = parse_request_line(self.take_line());
                    match parsed {
                        Ok(line) => {
                            self.method = Some(line.method);
                            self.url = Some(line.target);
                            self.version = Some(line.version);
                            self.host = line.authority;
                            self.state = CheckState::Headers;
                        }
                        Err(reason) => return ParseOutcome::MalformedRequest(reason),
                    }
                }
                CheckState::Headers => {
                    let parsed = parse_header_line(self.take_line());
                    match parsed {
                        Ok(HeaderLine::End) => {
                            if self.content_length.is_some() {
                                self.state = CheckState::Body;
                            } else {
                                self.complete = true;
                                return ParseOutcome::CompleteRequest;
                            }
                        }
                        Ok(HeaderLine::Host(host)) => self.host = Some(host),
                        Ok(HeaderLine::Connection { keep_alive }) => self.linger = keep_alive,
                        Ok(HeaderLine::ContentLength(len)) => {
                            if len > self.buf.len() - self.checked_index {
                                return ParseOutcome::MalformedRequest(
                                    "Content-Length exceeds read buffer",
                                );
                            }
                            self.content_length = Some(len);
                        }
                        Ok(HeaderLine::Other) => {}
                        Err(reason) => return ParseOutcome::MalformedRequest(reason),
                    }
                }
                CheckState::Body => return ParseOutcome::InternalError,
            }
        }
    }

    fn parse_content(&mut self) -> ParseOutcome {
        let len = self.content_length.unwrap_or(0);
        if self.read_index - self.start_line >= len {
            self.checked_index = self.start_line + len;
            self.complete = true;
            return ParseOutcome::CompleteRequest;
        }
        if self.is_full() {
            return ParseOutcome::MalformedRequest("request exceeds read buffer");
        }
        ParseOutcome::NeedMoreData
    }

    /// The parsed request, once [`process_read`](Self::process_read) has
    /// reported [`ParseOutcome::CompleteRequest`].
    pub fn request(&self) -> Option<Request> {
        if !self.complete {
            return None;
        }

        let body = match self.content_length {
            Some(len) => self.buf[self.start_line..self.start_line + len].to_vec(),
            None => Vec::new(),
        };

        Some(Request {
            method: self.method?,
            path: self.url.clone()?,
            version: self.version.clone()?,
            host: self.host.clone(),
            linger: self.linger,
            content_length: self.content_length,
            body,
        })
    }
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine, &'static str> {
    let text = std::str::from_utf8(line).map_err(|_| "request line is not valid UTF-8")?;
    let mut parts = text.splitn(3, [' ', '\t']);

    let method = parts.next().unwrap_or_default();
    let target = parts.next().ok_or("missing request target")?;
    let version = parts.next().ok_or("missing HTTP version")?;

    match Method::from_token(method) {
        Some(Method::GET) => {}
        Some(_) => return Err("method not supported"),
        None => return Err("unknown method"),
    }

    if version != "HTTP/1.1" {
        return Err("unsupported HTTP version");
    }

    let (path, authority) = strip_absolute_uri(target)?;
    if path.is_empty() || !path.starts_with('/') {
        return Err("request target is not an absolute path");
    }

    Ok(RequestLine {
        method: Method::GET,
        target: path.to_string(),
        version: version.to_string(),
        authority: authority.map(str::to_string),
    })
}

/// Reduces `http://host[:port]/path` to `/path`, returning the authority
/// separately. Origin-form targets pass through unchanged.
fn strip_absolute_uri(target: &str) -> Result<(&str, Option<&str>), &'static str> {
    const SCHEME: &str = "http://";

    match target.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => {
            let rest = &target[SCHEME.len()..];
            let slash = rest.find('/').ok_or("absolute URI without a path")?;
            let authority = &rest[..slash];
            let authority = (!authority.is_empty()).then_some(authority);
            Ok((&rest[slash..], authority))
        }
        _ => Ok((target, None)),
    }
}

fn parse_header_line(line: &[u8]) -> Result<HeaderLine, &'static str> {
    if line.is_empty() {
        return Ok(HeaderLine::End);
    }

    let text = std::str::from_utf8(line).map_err(|_| "header is not valid UTF-8")?;
    let (name, value) = text.split_once(':').ok_or("header line without ':'")?;
    let name = name.trim();
    let value = value.trim();

    if name.eq_ignore_ascii_case("Host") {
        Ok(HeaderLine::Host(value.to_string()))
    } else if name.eq_ignore_ascii_case("Connection") {
        let keep_alive = value
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("keep-alive"));
        Ok(HeaderLine::Connection { keep_alive })
    } else if name.eq_ignore_ascii_case("Content-Length") {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err("invalid Content-Length");
        }
        let len = value.parse::<usize>().map_err(|_| "invalid Content-Length")?;
        Ok(HeaderLine::ContentLength(len))
    } else {
        Ok(HeaderLine::Other)
    }
}
