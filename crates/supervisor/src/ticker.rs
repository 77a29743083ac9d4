use std::time::{Duration, Instant};

/// Fixed-interval ticker driving one background loop.
///
/// Arms itself on the first poll and fires once per elapsed interval
/// afterwards. Polled from the supervisor's `tick`; tests drive it with
/// synthetic instants.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    last: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the interval has elapsed since the last firing. Resets the
    /// timer when it fires.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now.duration_since(last) >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}
