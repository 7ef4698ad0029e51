//! Wall-clock and randomness are collaborators injected into the node so
//! the protocol core can be driven deterministically in tests, the way
//! `spec.md` §1 calls them out as external to the core logic.

use std::time::{SystemTime, UNIX_EPOCH};

/// Absolute wall-clock time source, seconds since `UNIX_EPOCH`.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Real wall clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Source of uniform randomness, used for route-score diversification at
/// broadcast time (spec.md §4.G).
pub trait RandomSource: Send + Sync {
    /// Uniform sample in `[lo, hi)`.
    fn uniform(&self, lo: f64, hi: f64) -> f64;
}

/// Real randomness backed by `rand::thread_rng`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        use rand::Rng;
        rand::thread_rng().gen_range(lo..hi)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock a test can advance by hand.
    pub struct FixedClock(AtomicU64);

    impl FixedClock {
        pub fn new(secs: f64) -> Self {
            Self(AtomicU64::new(secs.to_bits()))
        }

        pub fn set(&self, secs: f64) {
            self.0.store(secs.to_bits(), Ordering::SeqCst);
        }

        pub fn advance(&self, secs: f64) {
            self.set(self.now() + secs);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::SeqCst))
        }
    }

    /// Deterministic "random" source that always returns the low bound,
    /// for assertions that need a predictable score perturbation.
    pub struct ZeroRandom;

    impl RandomSource for ZeroRandom {
        fn uniform(&self, lo: f64, _hi: f64) -> f64 {
            lo
        }
    }
}
