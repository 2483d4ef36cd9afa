use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::http::connection::{ConnHandle, Connection};

/// Fixed arena of connection slots addressed by index.
///
/// All slots are created up front; their buffers are allocated on first
/// use. Freed indices go back on a free list and are handed out again, most
/// recently freed first.
pub struct ConnectionSlab {
    slots: Box<[Mutex<Connection>]>,
    free: Mutex<Vec<usize>>,
}

impl ConnectionSlab {
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<Mutex<Connection>> = (0..capacity)
            .map(|index| Mutex::new(Connection::empty(index)))
            .collect();

        // Popped from the back, so index 0 goes out first.
        let free: Vec<usize> = (0..capacity).rev().collect();

        Self {
            slots: slots.into_boxed_slice(),
            free: Mutex::new(free),
        }
    }

    /// Takes a free slot index, or `None` when every slot is in use.
    pub fn allocate(&self) -> Option<usize> {
        self.free_list().pop()
    }

    /// Returns a slot to the free list.
    pub fn release(&self, index: usize) {
        if index < self.slots.len() {
            self.free_list().push(index);
        }
    }

    pub fn lock(&self, index: usize) -> Option<MutexGuard<'_, Connection>> {
        let slot = self.slots.get(index)?;
        Some(slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Locks the slot `handle` points to if it still holds that connection.
    pub fn lock_handle(&self, handle: ConnHandle) -> Option<MutexGuard<'_, Connection>> {
        let conn = self.lock(handle.index)?;
        conn.matches(handle).then_some(conn)
    }

    /// Non-blocking lock. `Err(())` means another thread holds the slot.
    pub fn try_lock(&self, index: usize) -> Option<Result<MutexGuard<'_, Connection>, ()>> {
        let slot = self.slots.get(index)?;
        match slot.try_lock() {
            Ok(guard) => Some(Ok(guard)),
            Err(TryLockError::Poisoned(poisoned)) => Some(Ok(poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => Some(Err(())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    fn in_use(&self) -> usize {
        self.slots.len() - self.free_list().len()
    }

    fn free_list(&self) -> MutexGuard<'_, Vec<usize>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
