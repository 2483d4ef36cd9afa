use std::io::{self, IoSlice, Write};

use bytes::Bytes;

use crate::error::ConnectionError;
use crate::http::response::Response;

/// Capacity of a connection's write buffer, which holds the response head.
pub const WRITE_BUFFER_SIZE: usize = 1024;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Where a vectored flush stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Every byte of head and body has been written.
    Complete,
    /// The socket would block; wait for write readiness and flush again.
    Pending,
}

/// Serializes the status line and headers of `resp` into `out`. Returns
/// the number of bytes used.
pub fn serialize_head(resp: &Response, out: &mut [u8]) -> Result<usize, ConnectionError> {
    let capacity = out.len();
    let mut cursor: &mut [u8] = out;

    let written = (|| -> io::Result<()> {
        write!(
            cursor,
            "{} {} {}\r\n",
            HTTP_VERSION,
            resp.status.as_u16(),
            resp.status.reason_phrase()
        )?;
        for (k, v) in &resp.headers {
            write!(cursor, "{}: {}\r\n", k, v)?;
        }
        cursor.write_all(b"\r\n")
    })();

    match written {
        Ok(()) => Ok(capacity - cursor.len()),
        Err(_) => Err(ConnectionError::Internal(
            "response head exceeds write buffer".to_string(),
        )),
    }
}

/// Pending response state of one connection: the serialized head in a
/// fixed-size buffer, the body bytes, and how much has been sent.
pub struct ResponseWriter {
    head: Box<[u8]>,
    head_len: usize,
    body: Bytes,
    written: usize,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::unallocated()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        let mut writer = Self::unallocated();
        writer.allocate();
        writer
    }

    pub fn unallocated() -> Self {
        Self {
            head: Box::default(),
            head_len: 0,
            body: Bytes::new(),
            written: 0,
        }
    }

    pub fn allocate(&mut self) {
        if self.head.is_empty() {
            self.head = vec![0u8; WRITE_BUFFER_SIZE].into_boxed_slice();
        }
    }

    /// Loads `response` for sending, replacing anything still pending.
    pub fn prepare(&mut self, response: Response) -> Result<(), ConnectionError> {
        self.clear();
        self.head_len = serialize_head(&response, &mut self.head)?;
        self.body = response.body;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.head_len = 0;
        self.body = Bytes::new();
        self.written = 0;
    }

    pub fn head(&self) -> &[u8] {
        &self.head[..self.head_len]
    }

    pub fn total_len(&self) -> usize {
        self.head_len + self.body.len()
    }

    pub fn remaining(&self) -> usize {
        self.total_len() - self.written
    }

    pub fn is_pending(&self) -> bool {
        self.remaining() > 0
    }

    /// Writes as much as `out` accepts, one vectored write per attempt,
    /// resuming where the previous call stopped.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<WriteProgress> {
        while self.is_pending() {
            let (head_rest, body_rest) = if self.written < self.head_len {
                (&self.head[self.written..self.head_len], &self.body[..])
            } else {
                (&[][..], &self.body[self.written - self.head_len..])
            };

            let slices = [IoSlice::new(head_rest), IoSlice::new(body_rest)];
            match out.write_vectored(&slices) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(WriteProgress::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{ResponseBuilder, StatusCode};

    /// Accepts at most `limit` bytes per call, then reports WouldBlock once.
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
        block_next: bool,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.block_next = true;
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_partial_writes_resume() {
        let response = ResponseBuilder::new(StatusCode::Ok)
            .body(Bytes::from_static(b"hello world"))
            .build();

        let mut writer = ResponseWriter::new();
        writer.prepare(response).unwrap();
        let total = writer.total_len();

        let mut sink = Trickle {
            out: Vec::new(),
            limit: 7,
            block_next: false,
        };

        let mut rounds = 0;
        while writer.write_to(&mut sink).unwrap() == WriteProgress::Pending {
            rounds += 1;
            assert!(rounds < 100);
        }

        assert_eq!(sink.out.len(), total);
        assert!(sink.out.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(sink.out.ends_with(b"\r\n\r\nhello world"));
        assert!(!writer.is_pending());
    }

    #[test]
    fn test_head_too_large_for_buffer() {
        let response = ResponseBuilder::new(StatusCode::Ok)
            .header("X-Padding", "x".repeat(WRITE_BUFFER_SIZE))
            .build();

        let mut writer = ResponseWriter::new();
        assert!(matches!(
            writer.prepare(response),
            Err(ConnectionError::Internal(_))
        ));
    }
}
