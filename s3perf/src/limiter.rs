//! Admission control for in-flight requests.
//!
//! Every benchmark worker owns one [`SlotLimiter`]. The worker's driver thread calls
//! [`SlotLimiter::acquire`] before submitting a request and blocks while the configured number of
//! requests is already outstanding. The returned [`Slot`] travels with the request onto the async
//! runtime and is dropped by the completion handler, which releases it from whatever runtime thread
//! the request completed on. [`SlotLimiter::drain`] then blocks the driver until every request has
//! completed.
//!
//! The outstanding count lives behind a [`Mutex`] and all waiting happens on a single [`Condvar`],
//! so acquire, release and drain may run on different OS threads.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Bounds the number of outstanding requests of one worker.
#[derive(Debug)]
pub struct SlotLimiter {
    max: usize,
    outstanding: Mutex<usize>,
    changed: Condvar,
}

impl SlotLimiter {
    /// Creates a limiter that allows `max` outstanding requests.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero, since no request could ever be admitted.
    pub fn new(max: usize) -> Self {
        assert!(max > 0, "slot limiter needs at least one slot");

        Self {
            max,
            outstanding: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    /// The maximum number of outstanding requests.
    pub fn max(&self) -> usize {
        self.max
    }

    /// The number of currently outstanding requests.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock().unwrap()
    }

    /// Blocks until a slot is free, then takes it.
    ///
    /// The slot is released when the returned [`Slot`] is dropped.
    pub fn acquire(self: &Arc<Self>) -> Slot {
        let outstanding = self.outstanding.lock().unwrap();
        let mut outstanding = self
            .changed
            .wait_while(outstanding, |outstanding| *outstanding >= self.max)
            .unwrap();

        debug_assert!(*outstanding < self.max);
        *outstanding += 1;

        Slot {
            limiter: Arc::clone(self),
        }
    }

    /// Returns a slot and wakes up waiters.
    ///
    /// This is called by [`Slot`] on drop.
    ///
    /// # Panics
    ///
    /// Panics if no slot is taken, which means a slot was released twice.
    fn release(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        assert!(*outstanding > 0, "released a slot that was never acquired");
        *outstanding -= 1;

        // The driver waits either for a free slot or for the count to reach zero.
        self.changed.notify_all();
    }

    /// Blocks until all outstanding requests have completed.
    pub fn drain(&self) {
        let outstanding = self.outstanding.lock().unwrap();
        let _outstanding = self
            .changed
            .wait_while(outstanding, |outstanding| *outstanding > 0)
            .unwrap();
    }

    /// Blocks until all outstanding requests have completed or `timeout` has elapsed.
    ///
    /// On timeout, returns the number of requests that are still outstanding.
    pub fn drain_timeout(&self, timeout: Duration) -> Result<(), usize> {
        let outstanding = self.outstanding.lock().unwrap();
        let (outstanding, _) = self
            .changed
            .wait_timeout_while(outstanding, timeout, |outstanding| *outstanding > 0)
            .unwrap();

        match *outstanding {
            0 => Ok(()),
            remaining => Err(remaining),
        }
    }
}

/// A taken slot of a [`SlotLimiter`].
///
/// Dropping the slot releases it, which wakes up the driver if it is waiting in
/// [`SlotLimiter::acquire`] or [`SlotLimiter::drain`].
#[derive(Debug)]
#[must_use = "dropping a slot releases it immediately"]
pub struct Slot {
    limiter: Arc<SlotLimiter>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
