//! Query ID generation (`spec.md` §4.1).
//!
//! Each new connection starts its 16-bit message ID counter at a random
//! value and increments modulo 2^16 from there, so an observer cannot infer
//! how many queries a long-lived connection has carried from the ID alone.

use std::sync::atomic::{AtomicU16, Ordering};

use rand::RngCore;

/// A wrapping 16-bit ID counter seeded from a CSPRNG.
pub struct IdGenerator {
    next: AtomicU16,
}

impl IdGenerator {
    pub fn new() -> Self {
        let mut seed = [0u8; 2];
        rand::thread_rng().fill_bytes(&mut seed);
        Self {
            next: AtomicU16::new(u16::from_be_bytes(seed)),
        }
    }

    /// Return the next ID and advance the counter, wrapping at 2^16.
    pub fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_without_panicking() {
        let gen = IdGenerator {
            next: AtomicU16::new(u16::MAX),
        };
        let first = gen.next();
        let second = gen.next();
        assert_eq!(first, u16::MAX);
        assert_eq!(second, 0);
    }

    #[test]
    fn successive_ids_differ() {
        let gen = IdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }
}
