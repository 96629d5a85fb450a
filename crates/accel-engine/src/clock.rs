use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source for submit timestamps and timeout detection.
///
/// Production uses [`StdClock`]; tests drive the pipeline deterministically
/// with a [`FakeClock`].
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Monotonic host clock (nanoseconds since construction).
pub struct StdClock {
    base: Instant,
}

impl StdClock {
    pub fn new() -> StdClock {
        StdClock {
            base: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> StdClock {
        StdClock::new()
    }
}

impl Clock for StdClock {
    fn now_ns(&self) -> u64 {
        self.base.elapsed().as_nanos() as u64
    }
}

/// Manually advanced clock for deterministic tests.
pub struct FakeClock {
    ns: AtomicU64,
}

impl FakeClock {
    pub fn new() -> FakeClock {
        FakeClock {
            ns: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> FakeClock {
        FakeClock::new()
    }
}

impl Clock for FakeClock {
    fn now_ns(&self) -> u64 {
        self.ns.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_ns(), 0);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now_ns(), 1_500_000_000);
    }

    #[test]
    fn std_clock_is_monotonic() {
        let clock = StdClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
