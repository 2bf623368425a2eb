//! Object store clients used by the `s3perf` benchmark.
//!
//! The benchmark only ever talks to a store through the [`Backend`] trait, which exposes the three
//! requests it issues: put, get and delete of a whole object. Two implementations exist:
//!
//! - [`S3CompatibleBackend`] talks to Amazon S3 or any S3-compatible service (MinIO, Ceph, ...).
//! - [`InMemoryBackend`] keeps objects in a shared map. It is used for dry runs of the request
//!   scheduler and in tests.
//!
//! Clients are handed out by a [`BackendProvider`], which builds one client per worker.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod error;
mod provider;

pub use backend::{Backend, InMemoryBackend, S3CompatibleBackend, S3CompatibleConfig};
pub use error::{BackendError, BackendResult};
pub use provider::{BackendProvider, SharedBackend};
