//! Wall-clock arithmetic for a running workout.
//!
//! Nothing here sleeps or reads the clock. The driver owns the 1-second
//! ticker and passes the current unix time (milliseconds) in; this module
//! only decides what that time means for the session.

/// How an incoming start time related to the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Same start time, nothing changed.
    Unchanged,
    /// Overwritten without disturbing the ticker (small delta, or not running).
    Adopted,
    /// Overwritten while running with a delta above tolerance; the local
    /// ticker must restart so displayed time lines up again.
    Realigned,
}

/// Tracks workout elapsed time.
///
/// Elapsed time is `now - start - paused`, and never decreases while the
/// session lives unless the clock is reset or realigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkoutClock {
    start_ms: Option<u64>,
    running: bool,
    paused_at: Option<u64>,
    paused_total_ms: u64,
    elapsed_ms: u64,
}

impl WorkoutClock {
    /// A clock that has never started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or resume. Establishes the start time on first use.
    ///
    /// Returns false if the clock was already running.
    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.running {
            return false;
        }
        if self.start_ms.is_none() {
            self.start_ms = Some(now_ms);
        }
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total_ms += now_ms.saturating_sub(paused_at);
        }
        self.running = true;
        true
    }

    /// Pause. Returns false if the clock was not running.
    pub fn pause(&mut self, now_ms: u64) -> bool {
        if !self.running {
            return false;
        }
        self.tick(now_ms);
        self.running = false;
        self.paused_at = Some(now_ms);
        true
    }

    /// Stop advancing for good (termination). Elapsed time is kept.
    pub fn halt(&mut self) {
        self.running = false;
        self.paused_at = None;
    }

    /// Zero every field except the running flag.
    pub fn reset(&mut self) {
        *self = Self {
            running: self.running,
            ..Self::default()
        };
    }

    /// Recompute elapsed time for a tick. Returns elapsed milliseconds.
    pub fn tick(&mut self, now_ms: u64) -> u64 {
        if self.running {
            self.elapsed_ms = self.elapsed_ms.max(self.elapsed_at(now_ms));
        }
        self.elapsed_ms
    }

    /// Elapsed time at `now_ms` without mutating the clock.
    pub fn elapsed_at(&self, now_ms: u64) -> u64 {
        match (self.running, self.start_ms) {
            (true, Some(start)) => now_ms
                .saturating_sub(start)
                .saturating_sub(self.paused_total_ms),
            _ => self.elapsed_ms,
        }
    }

    /// Adopt the peer's start time. The peer is authoritative for this field.
    pub fn adopt_start(&mut self, remote_ms: u64, tolerance_ms: u64, now_ms: u64) -> Alignment {
        let previous = self.start_ms.replace(remote_ms);
        let delta = match previous {
            Some(local) if local == remote_ms => return Alignment::Unchanged,
            Some(local) => local.abs_diff(remote_ms),
            None => u64::MAX,
        };
        if self.running {
            // realignment is the one place elapsed time may move backwards
            self.elapsed_ms = self.elapsed_at(now_ms);
            if delta > tolerance_ms {
                return Alignment::Realigned;
            }
        }
        Alignment::Adopted
    }

    /// Whether elapsed time is advancing.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start time, unix milliseconds.
    pub fn start_ms(&self) -> Option<u64> {
        self.start_ms
    }

    /// Elapsed milliseconds as of the last tick.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}

/// True when a tick moves set elapsed time from below the rest duration to
/// at-or-above it. Fires once per crossing, never on a level.
pub fn crossed_rest_threshold(previous: u32, current: u32, rest_secs: u32) -> bool {
    previous < rest_secs && current >= rest_secs
}

/// True on ticks where a heartbeat Snapshot is due.
pub fn heartbeat_due(set_elapsed: u32, interval_secs: u32) -> bool {
    interval_secs > 0 && set_elapsed % interval_secs == 0
}
