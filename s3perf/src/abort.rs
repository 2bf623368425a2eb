//! Cooperative fail-fast cancellation of a stage.
//!
//! All workers of a stage share one [`AbortSignal`]. The first fatal error, usually reported by a
//! completion handler on a runtime thread, is stored in the signal. Drivers check the signal before
//! every submission and stop issuing requests once it is set. The orchestrator then returns the
//! stored error once all workers have drained.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StageError;

/// A one-shot cell for the first fatal error of a stage.
#[derive(Debug, Default)]
pub struct AbortSignal {
    triggered: AtomicBool,
    error: Mutex<Option<StageError>>,
}

impl AbortSignal {
    /// Creates a signal that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` and aborts the stage.
    ///
    /// Only the first error is kept. Returns `false` if the signal had already been triggered.
    pub fn trigger(&self, error: StageError) -> bool {
        let mut slot = self.error.lock().unwrap();
        if self.triggered.load(Ordering::Acquire) {
            return false;
        }

        *slot = Some(error);
        self.triggered.store(true, Ordering::Release);
        true
    }

    /// Returns `true` once an error has been recorded.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Takes the recorded error, if any.
    ///
    /// The signal stays triggered afterwards.
    pub fn take_error(&self) -> Option<StageError> {
        self.error.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untriggered() {
        let signal = AbortSignal::new();
        assert!(!signal.is_triggered());
        assert!(signal.take_error().is_none());
    }

    #[test]
    fn first_error_wins() {
        let signal = AbortSignal::new();

        assert!(signal.trigger(StageError::WorkerPanicked { worker: 1 }));
        assert!(!signal.trigger(StageError::WorkerPanicked { worker: 2 }));
        assert!(signal.is_triggered());

        let error = signal.take_error().unwrap();
        assert!(matches!(error, StageError::WorkerPanicked { worker: 1 }));

        // Taking the error does not re-arm the signal.
        assert!(signal.is_triggered());
        assert!(!signal.trigger(StageError::WorkerPanicked { worker: 3 }));
        assert!(signal.take_error().is_none());
    }
}
