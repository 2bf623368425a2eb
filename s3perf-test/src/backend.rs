//! An instrumented [`Backend`] for scheduler tests.
//!
//! [`InstrumentedBackend`] stores objects in an [`InMemoryBackend`] and additionally records every
//! request it receives, tracks how many requests are in flight per worker, and can inject latency,
//! failures and panics.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use s3perf_backend::{Backend, BackendError, BackendResult, InMemoryBackend};

/// The kind of a recorded request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Request {
    /// `put_object`
    Put,
    /// `get_object`
    Get,
    /// `delete_object`
    Delete,
}

#[derive(Debug, Default)]
struct Gauge {
    in_flight: usize,
    peak: usize,
}

/// A backend that records requests and concurrency, see the [module docs](self).
#[derive(Debug)]
pub struct InstrumentedBackend {
    store: InMemoryBackend,
    delay: Duration,
    fail_keys: HashSet<String>,
    panic_keys: HashSet<String>,
    requests: Mutex<Vec<(Request, String)>>,
    gauges: Mutex<HashMap<String, Gauge>>,
}

impl InstrumentedBackend {
    /// Wraps the given store without delay or failures.
    pub fn new(store: InMemoryBackend) -> Self {
        Self {
            store,
            delay: Duration::ZERO,
            fail_keys: HashSet::new(),
            panic_keys: HashSet::new(),
            requests: Mutex::new(Vec::new()),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    /// Delays every request by `delay` before it reaches the store.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every request for `key` fail.
    pub fn fail_on(mut self, key: impl Into<String>) -> Self {
        self.fail_keys.insert(key.into());
        self
    }

    /// Makes every request for `key` panic.
    pub fn panic_on(mut self, key: impl Into<String>) -> Self {
        self.panic_keys.insert(key.into());
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &InMemoryBackend {
        &self.store
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<(Request, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// The sorted keys of all requests of the given kind.
    pub fn keys_for(&self, request: Request) -> Vec<String> {
        let mut keys: Vec<_> = self
            .requests()
            .into_iter()
            .filter(|(r, _)| *r == request)
            .map(|(_, key)| key)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// The highest number of simultaneous requests observed for one key group.
    ///
    /// Keys are grouped by everything before their last `_`, so for benchmark keys of the form
    /// `<prefix><worker>_<index>` a group is the namespace of one worker.
    pub fn peak_in_flight(&self, group: &str) -> usize {
        self.gauges
            .lock()
            .unwrap()
            .get(group)
            .map_or(0, |gauge| gauge.peak)
    }

    /// The number of requests currently in flight across all groups.
    pub fn in_flight(&self) -> usize {
        self.gauges
            .lock()
            .unwrap()
            .values()
            .map(|gauge| gauge.in_flight)
            .sum()
    }

    async fn instrument<T, F>(&self, request: Request, key: &str, op: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        self.requests
            .lock()
            .unwrap()
            .push((request, key.to_owned()));

        if self.panic_keys.contains(key) {
            panic!("injected panic in {request:?} `{key}`");
        }

        let group = group_of(key);
        {
            let mut gauges = self.gauges.lock().unwrap();
            let gauge = gauges.entry(group.to_owned()).or_default();
            gauge.in_flight += 1;
            gauge.peak = gauge.peak.max(gauge.in_flight);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self.fail_keys.contains(key) {
            Err(BackendError::Generic {
                context: format!("{request:?} `{key}`"),
                cause: "injected failure".into(),
            })
        } else {
            op.await
        };

        if let Some(gauge) = self.gauges.lock().unwrap().get_mut(group) {
            gauge.in_flight -= 1;
        }

        result
    }
}

fn group_of(key: &str) -> &str {
    key.rsplit_once('_').map_or(key, |(group, _)| group)
}

#[async_trait::async_trait]
impl Backend for InstrumentedBackend {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    async fn put_object(&self, key: &str, body: Bytes) -> BackendResult<()> {
        self.instrument(Request::Put, key, self.store.put_object(key, body))
            .await
    }

    async fn get_object(&self, key: &str) -> BackendResult<Bytes> {
        self.instrument(Request::Get, key, self.store.get_object(key))
            .await
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        self.instrument(Request::Delete, key, self.store.delete_object(key))
            .await
    }
}
