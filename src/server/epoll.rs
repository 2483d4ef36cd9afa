//! Thin wrapper over the Linux epoll API.

use std::io;
use std::os::fd::RawFd;
use std::ptr;

pub use libc::epoll_event;

/// Client sockets waiting for a request: edge-triggered, one-shot.
pub const READ_INTEREST: u32 =
    (libc::EPOLLIN | libc::EPOLLET | libc::EPOLLRDHUP | libc::EPOLLONESHOT) as u32;
/// Client sockets with a response still pending.
pub const WRITE_INTEREST: u32 =
    (libc::EPOLLOUT | libc::EPOLLET | libc::EPOLLRDHUP | libc::EPOLLONESHOT) as u32;
/// The listening socket: edge-triggered, never one-shot.
pub const LISTEN_INTEREST: u32 = (libc::EPOLLIN | libc::EPOLLET) as u32;

pub const EV_READABLE: u32 = libc::EPOLLIN as u32;
pub const EV_WRITABLE: u32 = libc::EPOLLOUT as u32;
/// Both directions are gone or the socket errored.
pub const EV_HANGUP: u32 = (libc::EPOLLHUP | libc::EPOLLERR) as u32;
/// The peer shut down its sending side.
pub const EV_READ_HANGUP: u32 = libc::EPOLLRDHUP as u32;

/// The registration set. Owns the epoll descriptor.
#[derive(Debug)]
pub struct Epoll {
    fd: RawFd,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    pub fn add(&self, fd: RawFd, token: u64, interests: u32) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interests)
    }

    /// Replaces the interest set of `fd`. For one-shot registrations this
    /// is the re-arm.
    pub fn modify(&self, fd: RawFd, token: u64, interests: u32) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interests)
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Waits for events. An interrupted wait reports zero events.
    pub fn wait(&self, events: &mut [epoll_event], timeout_ms: i32) -> io::Result<usize> {
        let max = events.len().min(i32::MAX as usize) as i32;
        let res = unsafe { libc::epoll_wait(self.fd, events.as_mut_ptr(), max, timeout_ms) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(res as usize)
    }

    fn ctl(&self, op: i32, fd: RawFd, token: u64, interests: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events: interests,
            u64: token,
        };
        let res = unsafe { libc::epoll_ctl(self.fd, op, fd, &mut event) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Empty event array for [`Epoll::wait`].
pub fn event_buffer(len: usize) -> Vec<epoll_event> {
    vec![epoll_event { events: 0, u64: 0 }; len]
}
