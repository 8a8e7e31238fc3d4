//! Heart-rate recovery detection for auto-advance.
//!
//! A set shows up as a rise in heart rate; rest shows up as the rate falling
//! back below a fraction of the peak reached during the set. When that fall
//! is observed the detector fires once, and the session advances exactly as
//! if the user had pressed "next set".

use std::collections::VecDeque;

/// Parameters for [`RecoveryDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryTuning {
    /// Readings kept in the rolling window.
    pub window: usize,
    /// Readings required before anything is evaluated.
    pub min_readings: usize,
    /// Readings averaged at each end of the window.
    pub sample: usize,
    /// Rise of the recent mean over the older mean that marks a set.
    pub rise_delta: f64,
    /// Fraction of the peak the rate must drop below to count as recovered.
    pub recovery_fraction: f64,
}

impl Default for RecoveryTuning {
    fn default() -> Self {
        Self {
            window: 10,
            min_readings: 5,
            sample: 3,
            rise_delta: 5.0,
            recovery_fraction: 0.85,
        }
    }
}

/// Rolling-window detector for the set → recovery pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryDetector {
    tuning: RecoveryTuning,
    history: VecDeque<f64>,
    in_set: bool,
    peak: f64,
}

impl RecoveryDetector {
    /// Create a detector with the given parameters.
    pub fn new(tuning: RecoveryTuning) -> Self {
        Self {
            history: VecDeque::with_capacity(tuning.window),
            tuning,
            in_set: false,
            peak: 0.0,
        }
    }

    /// Feed one reading. Returns true exactly when an advance should fire.
    pub fn observe(&mut self, reading: f64) -> bool {
        self.history.push_back(reading);
        while self.history.len() > self.tuning.window {
            self.history.pop_front();
        }
        if self.history.len() < self.tuning.min_readings {
            return false;
        }

        if !self.in_set {
            let sample = self.tuning.sample.min(self.history.len());
            let older = mean(self.history.iter().take(sample));
            let recent = mean(self.history.iter().rev().take(sample));
            if recent - older > self.tuning.rise_delta {
                self.in_set = true;
                self.peak = reading;
            }
            return false;
        }

        self.peak = self.peak.max(reading);
        if reading < self.peak * self.tuning.recovery_fraction {
            self.reset();
            return true;
        }
        false
    }

    /// Forget everything: history, peak and set flag.
    pub fn reset(&mut self) {
        self.history.clear();
        self.in_set = false;
        self.peak = 0.0;
    }

    /// Whether a set is currently detected.
    pub fn in_set(&self) -> bool {
        self.in_set
    }

    /// Highest reading seen during the current set.
    pub fn peak(&self) -> Option<f64> {
        self.in_set.then_some(self.peak)
    }

    /// Number of buffered readings.
    pub fn buffered(&self) -> usize {
        self.history.len()
    }
}

impl Default for RecoveryDetector {
    fn default() -> Self {
        Self::new(RecoveryTuning::default())
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
