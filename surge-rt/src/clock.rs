//! `Virtual`/`Real` clock realizations for the executor's notion of time.
//!
//! The real realization anchors to `tokio::time::Instant` for a monotonic
//! source. The virtual realization is a plain in-memory counter the
//! executor itself advances, so tests can run timer-driven scenarios
//! without any real time elapsing.

/// Selects which `Clock` realization `Executor::new` constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    Virtual,
    Real,
}

pub trait Clock: std::fmt::Debug {
    fn now_ms(&self) -> u64;

    /// Advance to (at least) `target_ms`. For `VirtualClock` this is a pure
    /// bookkeeping update; for `RealClock` it blocks the calling thread
    /// until real wall-clock time reaches `target_ms`.
    fn sleep_until_ms(&mut self, target_ms: u64);
}

/// A monotonic counter advanced only by the executor's own scheduling loop:
/// no real time ever elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock {
    now_ms: u64,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock::default()
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn sleep_until_ms(&mut self, target_ms: u64) {
        if target_ms > self.now_ms {
            self.now_ms = target_ms;
        }
    }
}

/// Wall-clock realization anchored at construction time.
#[derive(Debug)]
pub struct RealClock {
    origin: tokio::time::Instant,
}

impl RealClock {
    pub fn new() -> Self {
        RealClock { origin: tokio::time::Instant::now() }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        RealClock::new()
    }
}

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_until_ms(&mut self, target_ms: u64) {
        let now = self.now_ms();
        if target_ms > now {
            std::thread::sleep(std::time::Duration::from_millis(target_ms - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_only_advances_forward() {
        let mut c = VirtualClock::new();
        c.sleep_until_ms(100);
        assert_eq!(c.now_ms(), 100);
        c.sleep_until_ms(50);
        assert_eq!(c.now_ms(), 100);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn real_clock_sleep_advances_elapsed_time() {
        let mut c = RealClock::new();
        let target = c.now_ms() + 5;
        c.sleep_until_ms(target);
        assert!(c.now_ms() >= target);
    }
}
