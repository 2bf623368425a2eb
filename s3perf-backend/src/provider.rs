use std::sync::Arc;

use crate::backend::{Backend, S3CompatibleBackend, S3CompatibleConfig};
use crate::error::BackendResult;

/// A reference-counted backend that can be moved into spawned requests.
pub type SharedBackend = Arc<dyn Backend>;

/// Hands out object store clients to benchmark workers.
#[derive(Debug, Clone)]
pub enum BackendProvider {
    /// Build a dedicated S3 client for every call to [`connect`](Self::connect).
    S3Compatible(S3CompatibleConfig),
    /// Hand out the same client to every caller.
    ///
    /// This is how workers share an [`InMemoryBackend`](crate::InMemoryBackend) store.
    Shared(SharedBackend),
}

impl BackendProvider {
    /// Returns a client for one worker.
    pub fn connect(&self) -> BackendResult<SharedBackend> {
        match self {
            Self::S3Compatible(config) => {
                tracing::debug!(?config, "Creating s3_compatible client");
                Ok(Arc::new(S3CompatibleBackend::new(config)?))
            }
            Self::Shared(backend) => Ok(Arc::clone(backend)),
        }
    }

    /// The name of the backend clients handed out by this provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3Compatible(_) => "s3-compatible",
            Self::Shared(backend) => backend.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::InMemoryBackend;

    use super::*;

    #[test]
    fn shared_provider_hands_out_same_store() {
        let provider = BackendProvider::Shared(Arc::new(InMemoryBackend::new()));

        let first = provider.connect().unwrap();
        let second = provider.connect().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.name(), "in-memory");
    }
}
