use std::fmt::Debug;

use bytes::Bytes;

use crate::error::BackendResult;

mod in_memory;
mod s3_compatible;

pub use in_memory::InMemoryBackend;
pub use s3_compatible::{S3CompatibleBackend, S3CompatibleConfig};

/// A client for an object store.
///
/// All requests are asynchronous and may be awaited concurrently from any runtime thread.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores `body` under `key`, overwriting any existing object.
    async fn put_object(&self, key: &str, body: Bytes) -> BackendResult<()>;

    /// Retrieves the full contents of the object stored under `key`.
    ///
    /// A missing object is reported as [`BackendError::NotFound`](crate::BackendError::NotFound).
    async fn get_object(&self, key: &str) -> BackendResult<Bytes>;

    /// Deletes the object stored under `key`.
    async fn delete_object(&self, key: &str) -> BackendResult<()>;
}
