//! Random object contents.

use std::fmt;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Number of bytes in a kilobyte, as used for object sizes.
pub const KB: usize = 1024;

/// The contents uploaded for every object of an iteration.
///
/// The buffer is generated once and then shared read-only by all workers. Cloning a payload only
/// bumps a reference count.
#[derive(Clone)]
pub struct Payload {
    bytes: Bytes,
}

impl Payload {
    /// Fills a new payload of `size_kb` kilobytes with random bytes.
    pub fn generate(size_kb: usize) -> Self {
        Self::from_rng(size_kb, &mut SmallRng::from_os_rng())
    }

    /// Like [`generate`](Self::generate), but with deterministic contents.
    pub fn with_seed(size_kb: usize, seed: u64) -> Self {
        Self::from_rng(size_kb, &mut SmallRng::seed_from_u64(seed))
    }

    fn from_rng(size_kb: usize, rng: &mut impl RngCore) -> Self {
        let mut buf = vec![0; size_kb * KB];
        rng.fill_bytes(&mut buf);

        Self {
            bytes: Bytes::from(buf),
        }
    }

    /// The length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-sized payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A handle to the contents, suitable as a request body.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_requested_size() {
        assert_eq!(Payload::generate(3).len(), 3 * KB);
        assert!(Payload::generate(0).is_empty());
    }

    #[test]
    fn seeded_payloads_are_reproducible() {
        let a = Payload::with_seed(4, 42);
        let b = Payload::with_seed(4, 42);
        let c = Payload::with_seed(4, 43);

        assert_eq!(a.bytes(), b.bytes());
        assert_ne!(a.bytes(), c.bytes());
    }

    #[test]
    fn clones_share_the_buffer() {
        let payload = Payload::generate(1);
        let clone = payload.clone();

        assert_eq!(payload.bytes().as_ptr(), clone.bytes().as_ptr());
    }

    #[test]
    fn contents_are_not_constant() {
        let payload = Payload::with_seed(1, 7);
        let bytes = payload.bytes();

        assert!(bytes.iter().any(|b| *b != bytes[0]));
    }
}
