use std::sync::atomic::{AtomicUsize, Ordering};

/// Server-wide counters, shared by the reactor and the workers.
#[derive(Debug, Default)]
pub struct ServerStats {
    active_conns: AtomicUsize,
    accepted: AtomicUsize,
    requests: AtomicUsize,
    rejected: AtomicUsize,
    protocol_errors: AtomicUsize,
    bytes_sent: AtomicUsize,
    ownership_violations: AtomicUsize,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub active_conns: usize,
    pub accepted: usize,
    pub requests: usize,
    pub rejected: usize,
    pub protocol_errors: usize,
    pub bytes_sent: usize,
    pub ownership_violations: usize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_conn(&self) {
        self.active_conns.fetch_add(1, Ordering::AcqRel);
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_conn(&self) {
        self.active_conns.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn active_conns(&self) -> usize {
        self.active_conns.load(Ordering::Acquire)
    }

    pub fn inc_req(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A worker found a connection slot already held by someone else.
    pub fn inc_ownership_violation(&self) {
        self.ownership_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_conns: self.active_conns.load(Ordering::Acquire),
            accepted: self.accepted.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            ownership_violations: self.ownership_violations.load(Ordering::Relaxed),
        }
    }
}
