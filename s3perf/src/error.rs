//! Errors that abort a benchmark stage.

use std::io;
use std::time::Duration;

use s3perf_backend::BackendError;
use thiserror::Error;

use crate::driver::Operation;

/// A failed request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The object store rejected the request or could not be reached.
    #[error("{operation} of `{key}` failed")]
    Backend {
        /// The kind of request.
        operation: Operation,
        /// The key of the requested object.
        key: String,
        /// The error returned by the backend.
        #[source]
        source: BackendError,
    },

    /// A downloaded object does not have the configured size.
    #[error("invalid object size {actual} for `{key}`, expected {expected} bytes")]
    SizeMismatch {
        /// The key of the downloaded object.
        key: String,
        /// The number of bytes received.
        actual: usize,
        /// The configured object size in bytes.
        expected: usize,
    },

    /// The request panicked before it completed.
    #[error("{operation} of `{key}` panicked")]
    Panicked {
        /// The kind of request.
        operation: Operation,
        /// The key of the requested object.
        key: String,
    },
}

/// The reason a stage was aborted.
///
/// The first error observed by any worker aborts the whole stage; there is no partial success.
#[derive(Debug, Error)]
pub enum StageError {
    /// A request failed or returned invalid data.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A worker could not create its object store client.
    #[error("worker {worker} failed to create a client")]
    Connect {
        /// The identity of the worker.
        worker: usize,
        /// The error returned while building the client.
        #[source]
        source: BackendError,
    },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker {worker}")]
    Spawn {
        /// The identity of the worker.
        worker: usize,
        /// The error returned by the OS.
        #[source]
        source: io::Error,
    },

    /// A worker thread panicked.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// The identity of the worker.
        worker: usize,
    },

    /// A worker's requests did not complete within the configured drain timeout.
    #[error("worker {worker} still had {outstanding} requests outstanding after {timeout:?}")]
    DrainTimeout {
        /// The identity of the worker.
        worker: usize,
        /// The number of requests that had not completed.
        outstanding: usize,
        /// The configured drain timeout.
        timeout: Duration,
    },
}
