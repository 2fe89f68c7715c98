//! Production environment using system time and OS randomness.

use crate::env::Environment;

/// Production environment.
///
/// `std::time::Instant` for monotonic time, `SystemTime` for message
/// timestamps, and getrandom for connection IDs.
///
/// # Panics
///
/// Panics if the OS RNG fails. A relay that cannot draw connection IDs cannot
/// tell participants apart.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_millis(&self) -> u64 {
        // A clock set before 1970 stamps messages with zero.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = env.now();

        assert!(t2 > t1, "time should advance");
    }

    #[test]
    fn wall_clock_is_after_2020() {
        let env = SystemEnv::new();
        assert!(env.wall_clock_millis() > 1_577_836_800_000);
    }

    #[test]
    fn random_bytes_differ() {
        let env = SystemEnv::new();

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        env.random_bytes(&mut a);
        env.random_bytes(&mut b);

        assert_ne!(a, b, "random bytes should differ");
    }
}
