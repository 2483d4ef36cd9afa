//! Fixed-size worker pool fed by a bounded FIFO queue.
//!
//! Producers call [`WorkerPool::submit`], which never blocks beyond the
//! queue lock: when the queue is at capacity the item is handed back in
//! [`SubmitError::QueueFull`]. Each worker waits on a counting semaphore,
//! pops one item under the lock, and runs the handler outside it.

pub mod semaphore;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::{PoolError, SubmitError};
pub use semaphore::Semaphore;

type Handler<T> = dyn Fn(T) + Send + Sync + 'static;

struct PoolState<T> {
    queue: VecDeque<T>,
    stopped: bool,
}

struct Shared<T> {
    state: Mutex<PoolState<T>>,
    pending: Semaphore,
    capacity: usize,
    handler: Box<Handler<T>>,
}

pub struct WorkerPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `threads` workers, each running `handler` on the items it
    /// pops. If any spawn fails, the already running workers are stopped
    /// and joined before the error is returned.
    pub fn start<F>(threads: usize, capacity: usize, handler: F) -> Result<Self, PoolError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if threads == 0 {
            return Err(PoolError::NoThreads);
        }
        if capacity == 0 {
            return Err(PoolError::NoCapacity);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                stopped: false,
            }),
            pending: Semaphore::new(0),
            capacity,
            handler: Box::new(handler),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
        };

        for index in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("quay-worker-{}", index))
                .spawn(move || run_worker(index, &shared));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(source) => {
                    pool.shutdown();
                    return Err(PoolError::Spawn { index, source });
                }
            }
        }

        tracing::info!(threads, capacity, "Worker pool started");
        Ok(pool)
    }

    /// Appends `item` to the queue and wakes one worker.
    pub fn submit(&self, item: T) -> Result<(), SubmitError<T>> {
        let mut state = self.lock_state();
        if state.stopped {
            return Err(SubmitError::ShutDown(item));
        }
        if state.queue.len() >= self.shared.capacity {
            return Err(SubmitError::QueueFull(item));
        }
        state.queue.push_back(item);
        drop(state);

        self.shared.pending.post();
        Ok(())
    }

    /// Stops accepting work, wakes and joins every worker, and returns the
    /// items that were still queued. Calling it twice is harmless.
    pub fn shutdown(&mut self) -> Vec<T> {
        let discarded: Vec<T> = {
            let mut state = self.lock_state();
            state.stopped = true;
            state.queue.drain(..).collect()
        };

        self.shared.pending.post_many(self.workers.len());

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }

        if !discarded.is_empty() {
            tracing::debug!(discarded = discarded.len(), "Discarded queued work on shutdown");
        }
        discarded
    }

    pub fn queued(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn run_worker<T>(index: usize, shared: &Shared<T>) {
    tracing::debug!(worker = index, "Worker entering main loop");

    loop {
        shared.pending.wait();

        let item = {
            let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.stopped {
                break;
            }
            state.queue.pop_front()
        };

        // A permit without an item: go back to waiting.
        let Some(item) = item else {
            continue;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| (shared.handler)(item)));
        if result.is_err() {
            tracing::error!(worker = index, "Handler panicked, worker keeps running");
        }
    }

    tracing::debug!(worker = index, "Worker exiting");
}
