//! Injected randomness for job identifiers and retry jitter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use uuid::Uuid;

use crate::util::lock::mutex_lock;

/// Thread-safe random generator shared by the pipeline through its context.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    pub fn from_os() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// A random (version 4) UUID drawn from this generator.
    pub fn next_uuid(&self) -> Uuid {
        let bytes: [u8; 16] = mutex_lock(&self.inner, "application::random", "next_uuid").random();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    /// Uniform duration in `[0, upper]` at millisecond granularity.
    pub fn duration_up_to(&self, upper: Duration) -> Duration {
        let upper_ms = u64::try_from(upper.as_millis()).unwrap_or(u64::MAX);
        if upper_ms == 0 {
            return Duration::ZERO;
        }
        let millis =
            mutex_lock(&self.inner, "application::random", "duration_up_to").random_range(0..=upper_ms);
        Duration::from_millis(millis)
    }
}

impl std::fmt::Debug for SharedRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRng").finish_non_exhaustive()
    }
}
