//! In-memory backend for dry runs and tests.
//!
//! The backend is [`Clone`] and all clones share the same map, so every worker of a benchmark sees
//! the objects written by the others, just like with a real bucket. Tests can keep a handle to
//! inspect or tamper with stored objects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::Backend;
use crate::error::{BackendError, BackendResult};

type Store = HashMap<String, Bytes>;

/// An object store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl InMemoryBackend {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the stored contents, if present.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.store.lock().unwrap().get(key).cloned()
    }

    /// Writes an entry directly, bypassing the [`Backend`] trait.
    ///
    /// Useful for simulating a store that returns corrupted objects.
    pub fn insert(&self, key: impl Into<String>, body: Bytes) {
        self.store.lock().unwrap().insert(key.into(), body);
    }

    /// Returns the sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.store.lock().unwrap().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().is_empty()
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(&self, key: &str, body: Bytes) -> BackendResult<()> {
        self.insert(key, body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> BackendResult<Bytes> {
        self.get_stored(key).ok_or_else(|| BackendError::NotFound {
            key: key.to_owned(),
        })
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_objects() {
        let backend = InMemoryBackend::new();
        let other = backend.clone();

        backend
            .put_object("obj/0_0", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let body = other.get_object("obj/0_0").await.unwrap();
        assert_eq!(body, Bytes::from_static(b"hello"));
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let backend = InMemoryBackend::new();

        let err = backend.get_object("obj/0_0").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { key } if key == "obj/0_0"));
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let backend = InMemoryBackend::new();
        backend.insert("obj/0_0", Bytes::from_static(b"x"));
        backend.insert("obj/0_1", Bytes::from_static(b"y"));

        backend.delete_object("obj/0_0").await.unwrap();
        assert_eq!(backend.keys(), ["obj/0_1"]);

        backend.delete_object("obj/0_1").await.unwrap();
        assert!(backend.is_empty());
    }
}
