//! The per-worker request loop.
//!
//! A [`Driver`] issues one request per object of its worker. Before every submission it takes a
//! slot from its [`SlotLimiter`], then spawns the request onto the async runtime and moves on. The
//! request's completion handler validates the response, records metrics and drops the slot, which
//! lets the driver submit the next request. After the last submission the driver drains the
//! limiter, so it never returns while one of its requests is still in flight.
//!
//! The first failing request triggers the stage's [`AbortSignal`]. Drivers stop submitting once
//! the signal is set, but still drain the requests they already started.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use s3perf_backend::{Backend, SharedBackend};
use tokio::runtime::Handle;

use crate::abort::AbortSignal;
use crate::error::{RequestError, StageError};
use crate::key::object_key;
use crate::limiter::{Slot, SlotLimiter};
use crate::payload::Payload;
use crate::report::Metrics;
use crate::stage::StagePlan;

/// The kind of request issued during a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Put objects.
    Upload,
    /// Get objects and verify their size.
    Download,
    /// Delete objects.
    Cleanup,
}

impl Operation {
    /// The upper-case name used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Upload => "UPLOAD",
            Self::Download => "DOWNLOAD",
            Self::Cleanup => "CLEANUP",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Cleanup => "delete",
        })
    }
}

/// What a stage does with each object.
#[derive(Clone, Debug)]
pub enum Workload {
    /// Upload the payload under every key.
    Upload(Payload),
    /// Download every key and expect `object_size` bytes.
    Download {
        /// The expected size of every object in bytes.
        object_size: usize,
    },
    /// Delete every key.
    Cleanup,
}

impl Workload {
    /// The kind of request issued for this workload.
    pub fn operation(&self) -> Operation {
        match self {
            Self::Upload(_) => Operation::Upload,
            Self::Download { .. } => Operation::Download,
            Self::Cleanup => Operation::Cleanup,
        }
    }

    /// Performs the request for one key, returning the number of payload bytes transferred.
    async fn execute(&self, backend: &dyn Backend, key: &str) -> Result<u64, RequestError> {
        let backend_error = |source| RequestError::Backend {
            operation: self.operation(),
            key: key.to_owned(),
            source,
        };

        match self {
            Self::Upload(payload) => {
                backend
                    .put_object(key, payload.bytes())
                    .await
                    .map_err(backend_error)?;
                Ok(payload.len() as u64)
            }
            Self::Download { object_size } => {
                let body = backend.get_object(key).await.map_err(backend_error)?;
                if body.len() != *object_size {
                    return Err(RequestError::SizeMismatch {
                        key: key.to_owned(),
                        actual: body.len(),
                        expected: *object_size,
                    });
                }
                Ok(body.len() as u64)
            }
            Self::Cleanup => {
                backend.delete_object(key).await.map_err(backend_error)?;
                Ok(0)
            }
        }
    }
}

/// Issues the requests of one worker.
pub(crate) struct Driver<'a> {
    worker: usize,
    plan: &'a StagePlan,
    backend: SharedBackend,
    runtime: &'a Handle,
    abort: &'a Arc<AbortSignal>,
}

impl<'a> Driver<'a> {
    pub(crate) fn new(
        worker: usize,
        plan: &'a StagePlan,
        backend: SharedBackend,
        runtime: &'a Handle,
        abort: &'a Arc<AbortSignal>,
    ) -> Self {
        Self {
            worker,
            plan,
            backend,
            runtime,
            abort,
        }
    }

    /// Submits all requests of this worker and waits for them to complete.
    ///
    /// Errors are reported through the abort signal. The returned metrics only cover requests that
    /// completed successfully.
    pub(crate) fn run(self) -> Metrics {
        let limiter = Arc::new(SlotLimiter::new(self.plan.max_outstanding));
        let metrics = Arc::new(Mutex::new(Metrics::default()));

        let mut submitted = 0;
        for index in 0..self.plan.num_objects {
            let slot = limiter.acquire();
            if self.abort.is_triggered() {
                tracing::debug!(worker = self.worker, submitted, "stage aborted, stop submitting");
                break;
            }

            let key = object_key(&self.plan.prefix, self.worker, index);
            self.submit(key, slot, Arc::clone(&metrics));
            submitted += 1;
        }

        self.drain(&limiter);

        let metrics = std::mem::take(&mut *metrics.lock().unwrap());
        tracing::debug!(
            worker = self.worker,
            submitted,
            completed = metrics.completed,
            "worker finished"
        );
        metrics
    }

    /// Spawns the request for `key` and returns without waiting for it.
    fn submit(&self, key: String, slot: Slot, metrics: Arc<Mutex<Metrics>>) {
        let worker = self.worker;
        let workload = self.plan.workload.clone();
        let backend = Arc::clone(&self.backend);
        let abort = Arc::clone(self.abort);

        self.runtime.spawn(async move {
            let start = Instant::now();
            // A panic counts as a failed request.
            let result = AssertUnwindSafe(workload.execute(backend.as_ref(), &key))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(RequestError::Panicked {
                        operation: workload.operation(),
                        key: key.clone(),
                    })
                });
            complete(worker, result, start.elapsed(), &metrics, &abort);
            drop(slot);
        });
    }

    fn drain(&self, limiter: &SlotLimiter) {
        let Some(timeout) = self.plan.drain_timeout else {
            limiter.drain();
            return;
        };

        if let Err(outstanding) = limiter.drain_timeout(timeout) {
            tracing::error!(worker = self.worker, outstanding, ?timeout, "drain timed out");
            self.abort.trigger(StageError::DrainTimeout {
                worker: self.worker,
                outstanding,
                timeout,
            });
        }
    }
}

/// Handles the outcome of one request.
///
/// Runs on an arbitrary runtime thread. The request's slot is released after this returns, so an
/// error is always visible to the driver before it can submit again.
fn complete(
    worker: usize,
    result: Result<u64, RequestError>,
    latency: Duration,
    metrics: &Mutex<Metrics>,
    abort: &AbortSignal,
) {
    match result {
        Ok(bytes) => metrics.lock().unwrap().record(bytes, latency),
        Err(error) => {
            tracing::error!(
                worker,
                error = &error as &dyn std::error::Error,
                "request failed, aborting stage"
            );
            abort.trigger(error.into());
        }
    }
}
