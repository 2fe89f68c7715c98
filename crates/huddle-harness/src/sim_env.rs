//! Simulated environment.
//!
//! Virtual time that only moves when the test says so, and a ChaCha RNG seeded
//! by the test. Two runs with the same seed and the same steps produce the same
//! connection IDs and the same message timestamps.

use std::{
    ops::Sub,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use huddle_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall clock at simulation start: 2023-11-14T22:13:20Z.
const SIM_EPOCH_MILLIS: u64 = 1_700_000_000_000;

/// Point in virtual time, as an offset from simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct SimState {
    elapsed: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic environment shared by every simulated participant and the
/// simulated relay.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment with RNG seeded from `seed` and the clock at zero.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                elapsed: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        self.lock().elapsed += by;
    }

    /// Time since simulation start.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.lock().elapsed)
    }

    fn wall_clock_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.lock().elapsed.as_millis()).unwrap_or(u64::MAX);
        SIM_EPOCH_MILLIS.saturating_add(elapsed)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        for _ in 0..10 {
            assert_eq!(a.random_u64(), b.random_u64());
        }
    }

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = SimEnv::with_seed(1);
        let t0 = env.now();
        assert_eq!(env.now(), t0);
        assert_eq!(env.wall_clock_millis(), SIM_EPOCH_MILLIS);

        env.advance(Duration::from_millis(250));
        assert_eq!(env.now() - t0, Duration::from_millis(250));
        assert_eq!(env.wall_clock_millis(), SIM_EPOCH_MILLIS + 250);
    }

    #[test]
    fn clones_share_state() {
        let env = SimEnv::with_seed(3);
        let other = env.clone();
        other.advance(Duration::from_secs(1));
        assert_eq!(env.elapsed(), Duration::from_secs(1));
    }
}
