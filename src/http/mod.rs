//! HTTP protocol implementation.
//!
//! A minimal HTTP/1.1 front end: `GET` requests for static files, with
//! optional keep-alive.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: Per-socket state: draining reads, driving the parser, flushing responses
//! - **`parser`**: Incremental line splitter and request-line/headers/body state machine
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes a response head and writes head and body without blocking
//! - **`resolver`**: Maps request paths to files under the served root
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection lifecycle
//!
//! Ownership of a connection moves between the reactor and one worker;
//! every hand-back ends with a one-shot re-arm.
//!
//! ```text
//!   accept ──▶ [armed: EPOLLIN] ──readable──▶ reactor drains socket
//!                    ▲                              │ submit
//!                    │                              ▼
//!                    │                     worker: parse + resolve
//!                    │                              │
//!                    │          NeedMoreData ◀──────┤
//!                    │                              ▼
//!                    ├──── keep-alive ◀──── write response ──▶ close
//!                    │                              │ would block
//!                    │                              ▼
//!                    └──── keep-alive ◀──── [armed: EPOLLOUT] ──▶ close
//! ```

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod resolver;
pub mod response;
pub mod writer;
