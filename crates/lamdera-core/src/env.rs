//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Enables
//! deterministic tests via [`MockEnv`] and production use via [`StdEnv`].

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while tests use
    /// virtual time so backoff and reconnect timing is reproducible.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - This method MUST return values that never decrease within a single
    ///   execution context. Subsequent calls must return times >= previous
    ///   calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not protocol logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// session IDs or request IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }

    /// Generates a uniform random value in `[0.0, 1.0)`.
    ///
    /// Used for backoff jitter, where callers need a real-valued offset
    /// rather than a raw integer.
    fn random_unit_interval(&self) -> f64 {
        // 53 bits gives full f64 mantissa precision without bias.
        let bits = self.random_u64() >> 11;
        (bits as f64) / (1u64 << 53) as f64
    }
}

/// Production [`Environment`] backed by [`std::time::Instant`] and the
/// operating system's cryptographically secure RNG.
#[derive(Debug, Clone, Default)]
pub struct StdEnv;

impl Environment for StdEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), buffer);
    }
}

/// Deterministic [`Environment`] for tests: time only advances when
/// [`MockEnv::advance`] is called, and randomness is drawn from a
/// caller-supplied seed so test assertions are reproducible.
#[derive(Debug, Clone)]
pub struct MockEnv {
    inner: Arc<Mutex<MockEnvState>>,
}

#[derive(Debug)]
struct MockEnvState {
    now: Duration,
    rng: rand::rngs::StdRng,
}

impl MockEnv {
    /// Creates a new mock environment with virtual time starting at zero.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            inner: Arc::new(Mutex::new(MockEnvState {
                now: Duration::ZERO,
                rng: rand::rngs::StdRng::seed_from_u64(seed),
            })),
        }
    }

    /// Advances the virtual clock by `duration`. Does not actually sleep.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock().expect("mock env lock poisoned");
        state.now += duration;
    }
}

impl Environment for MockEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        self.inner.lock().expect("mock env lock poisoned").now
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut state = self.inner.lock().expect("mock env lock poisoned");
        rand::RngCore::fill_bytes(&mut state.rng, buffer);
    }
}
