//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). The
//! production environment reads the system clock and OS entropy; the
//! simulation environment uses a manual clock and a seeded RNG so whole
//! multi-participant runs replay exactly.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `wall_clock_millis()` is suitable for message timestamps (Unix epoch)
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`; simulation uses a virtual
    /// instant driven by the test.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Wall clock time in milliseconds since the Unix epoch.
    ///
    /// Stamped onto outgoing chat messages. May jump; never use it for
    /// ordering.
    fn wall_clock_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, a simulated environment produces the same
    /// sequence.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for connection IDs and message nonces.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
