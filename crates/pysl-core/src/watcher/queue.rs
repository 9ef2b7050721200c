//! Output queue shared by the reader and the display loop

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<String>,
    closed: bool,
}

/// FIFO of message texts with wake-on-append
///
/// The reader pushes, the display loop pops oldest-first. Every push wakes a
/// pending [`wait_for_item`](Self::wait_for_item), including one that started
/// before the push.
#[derive(Debug, Default)]
pub struct OutputQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and wake the waiting display loop
    pub fn push(&self, text: String) {
        let mut state = self.state.lock();
        state.items.push_back(text);
        self.available.notify_all();
    }

    /// Take the oldest item, if any
    pub fn try_pop(&self) -> Option<String> {
        self.state.lock().items.pop_front()
    }

    /// Block until an item is queued, the queue is closed, or `timeout`
    /// elapses. Returns whether an item is available.
    pub fn wait_for_item(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        // Queue state is re-checked under the lock after every wake
        while state.items.is_empty() && !state.closed {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
        !state.items.is_empty()
    }

    /// Stop the queue: pending and future waits return immediately
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
