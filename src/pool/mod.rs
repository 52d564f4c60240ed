//! Blocking Resource Pool
//!
//! A bounded pool of expensive-to-create handles (RPC client stubs, database
//! sessions) checked out and returned by callers. Acquire blocks the calling
//! thread, so it must only be used off the reactor threads — the dispatcher
//! thread or a dedicated blocking thread.

mod endpoints;

pub use endpoints::{EndpointKey, EndpointPools, RpcChannel};

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct PoolState<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// Fixed-capacity blocking object pool with graceful shutdown.
///
/// Invariant while running: available items plus checked-out items equals the
/// construction capacity. After [`stop`](ResourcePool::stop), every blocked
/// and future [`acquire`](ResourcePool::acquire) returns `None` and returned
/// items are dropped instead of reused.
pub struct ResourcePool<T> {
    capacity: usize,
    state: Mutex<PoolState<T>>,
    available: Condvar,
}

impl<T> ResourcePool<T> {
    /// Build a pool of `capacity` items produced by `factory`.
    pub fn new(capacity: usize, mut factory: impl FnMut() -> T) -> Self {
        let items = (0..capacity).map(|_| factory()).collect();
        Self {
            capacity,
            state: Mutex::new(PoolState {
                items,
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently available for checkout.
    pub fn available(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check out an item, blocking the calling thread until one is available
    /// or the pool is stopped. Returns `None` only once stopped.
    pub fn acquire(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.stopped {
            self.available.wait(&mut state);
        }
        if state.stopped {
            return None;
        }
        state.items.pop_front()
    }

    /// Return a checked-out item and wake one waiter.
    ///
    /// If the pool has stopped, the item is dropped; nobody will read from
    /// the pool again.
    pub fn release(&self, item: T) {
        let mut state = self.state.lock();
        if state.stopped {
            tracing::debug!("pool stopped; dropping returned item");
            return;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
    }

    /// Stop the pool: drop every pooled item and wake all waiters so every
    /// blocked caller observes shutdown promptly.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.items.clear();
        drop(state);
        self.available.notify_all();
        tracing::debug!(capacity = self.capacity, "resource pool stopped");
    }
}
