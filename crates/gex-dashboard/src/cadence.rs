//! Redraw cadence.
//!
//! The first redraw after a (re)start is immediate. After that, a redraw is
//! due once the refresh interval has elapsed since the previous one.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RedrawCadence {
    interval: Duration,
    last_redraw: Option<Instant>,
}

impl RedrawCadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_redraw: None,
        }
    }

    /// Time left until the next redraw, or `None` when one is due.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_redraw?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.interval).then(|| self.interval - elapsed)
    }

    pub fn mark_redrawn(&mut self, now: Instant) {
        self.last_redraw = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_redraw_is_immediate() {
        let cadence = RedrawCadence::new(Duration::from_secs(60));
        assert_eq!(cadence.remaining(Instant::now()), None);
    }

    #[test]
    fn test_suppressed_until_interval_elapses() {
        let start = Instant::now();
        let mut cadence = RedrawCadence::new(Duration::from_secs(10));
        cadence.mark_redrawn(start);

        assert_eq!(cadence.remaining(start), Some(Duration::from_secs(10)));
        assert_eq!(
            cadence.remaining(start + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert_eq!(cadence.remaining(start + Duration::from_secs(10)), None);
        assert_eq!(cadence.remaining(start + Duration::from_secs(11)), None);
    }
}
