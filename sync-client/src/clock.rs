//! Wall-clock source for the device driver.
//!
//! Reads the system clock once, then advances with tokio's monotonic clock.
//! Under a paused test runtime this makes unix time fully deterministic.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Unix-millisecond clock anchored at creation.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor_unix_ms: u64,
    anchor: Instant,
}

impl Clock {
    /// Anchor on the current system time.
    pub fn system() -> Self {
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::starting_at(unix_ms)
    }

    /// Anchor on a fixed unix time.
    pub fn starting_at(unix_ms: u64) -> Self {
        Self {
            anchor_unix_ms: unix_ms,
            anchor: Instant::now(),
        }
    }

    /// Current unix time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.anchor_unix_ms + self.anchor.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn advances_with_tokio_time() {
        let clock = Clock::starting_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now_ms(), 2_500);
    }

    #[test]
    fn system_clock_is_after_2024() {
        let clock = Clock::system();
        assert!(clock.now_ms() > 1_704_067_200_000);
    }
}
