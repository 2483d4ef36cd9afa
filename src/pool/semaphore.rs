use std::sync::{Condvar, Mutex, PoisonError};

/// Counting semaphore built from a mutex-guarded permit count and a
/// condition variable.
///
/// `post` adds one permit and wakes one waiter; `wait` blocks until a
/// permit is available and takes it.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }

    /// Adds `n` permits at once and wakes every waiter.
    pub fn post_many(&self, n: usize) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits += n;
        drop(permits);
        self.available.notify_all();
    }

    pub fn wait(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        // Condvar waits may return spuriously.
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        *self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
