use std::net::TcpListener;

use tracing::info;

use crate::error::{ServerError, ServerResult};

/// Binds a non-blocking listening socket.
pub fn bind(addr: &str) -> ServerResult<TcpListener> {
    let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    listener.set_nonblocking(true)?;

    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Writes to a socket the peer has closed must fail with `EPIPE` instead of
/// killing the process.
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}
