use std::time::Instant;

/// Monotonic clock shared by every buffer of a capture session
///
/// Copies share the same origin, so readings from different threads are
/// directly comparable.
#[derive(Debug, Clone, Copy)]
pub struct TraceClock {
    origin: Instant,
}

impl Default for TraceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceClock {
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Nanoseconds since the clock was created
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        // u64 nanoseconds cover ~584 years
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = TraceClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_copies_share_origin() {
        let clock = TraceClock::new();
        let copy = clock;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let from_thread = std::thread::spawn(move || copy.now_ns()).join().unwrap();
        assert!(from_thread >= 2_000_000);
        assert!(clock.now_ns() >= from_thread);
    }
}
