//! Velocity tracking
//!
//! A time-decaying counter of how fast proposals are arriving. Every created
//! proposal adds a fixed increment; the accumulated value halves every
//! `half_life_hours` of wall-clock time.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Used when a caller passes a non-positive increment, which would stall the penalty
pub const DEFAULT_VELOCITY_INCREMENT: f64 = 0.05;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityTracker {
    value: f64,
    last_updated: DateTime<Utc>,
    increment: f64,
    half_life_hours: f64,
}

impl VelocityTracker {
    pub fn new(increment: f64, half_life_hours: f64) -> Self {
        Self::new_at(increment, half_life_hours, Utc::now())
    }

    pub fn new_at(increment: f64, half_life_hours: f64, now: DateTime<Utc>) -> Self {
        Self {
            value: 0.0,
            last_updated: now,
            increment: if increment.is_finite() && increment > 0.0 {
                increment
            } else {
                DEFAULT_VELOCITY_INCREMENT
            },
            half_life_hours,
        }
    }

    /// Current penalty, decayed up to now
    pub fn penalty(&self) -> f64 {
        self.penalty_at(Utc::now())
    }

    pub fn penalty_at(&self, now: DateTime<Utc>) -> f64 {
        self.decayed(self.value, hours_between(self.last_updated, now))
    }

    /// Register one arriving proposal
    pub fn record_event(&mut self) {
        self.record_event_at(Utc::now());
    }

    pub fn record_event_at(&mut self, now: DateTime<Utc>) {
        let current = self.penalty_at(now);
        self.value = current + self.increment;
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// Apply `elapsed_hours` of decay on top of the wall-clock decay
    pub fn decay(&mut self, elapsed_hours: f64) {
        if !elapsed_hours.is_finite() || elapsed_hours <= 0.0 {
            return;
        }
        self.value = self.decayed(self.value, elapsed_hours);
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.last_updated = Utc::now();
    }

    fn decayed(&self, value: f64, elapsed_hours: f64) -> f64 {
        if elapsed_hours <= 0.0 || self.half_life_hours <= 0.0 {
            return value.max(0.0);
        }
        (value * 0.5_f64.powf(elapsed_hours / self.half_life_hours)).max(0.0)
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 3_600_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tracker() -> (VelocityTracker, DateTime<Utc>) {
        let now = Utc::now();
        (VelocityTracker::new_at(0.05, 1.0, now), now)
    }

    #[test]
    fn test_starts_at_zero() {
        let (tracker, now) = tracker();
        assert_eq!(tracker.penalty_at(now), 0.0);
    }

    #[test]
    fn test_consecutive_events_accumulate() {
        let (mut tracker, now) = tracker();
        tracker.record_event_at(now);
        let one = tracker.penalty_at(now);
        tracker.record_event_at(now);
        let two = tracker.penalty_at(now);
        assert!(two > one);
        assert!((two - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_burst_is_monotonic() {
        let (mut tracker, start) = tracker();
        let mut previous = 0.0;
        for i in 0..10 {
            let now = start + Duration::milliseconds(i * 50);
            tracker.record_event_at(now);
            let penalty = tracker.penalty_at(now);
            assert!(penalty > previous);
            previous = penalty;
        }
    }

    #[test]
    fn test_zero_increment_still_grows() {
        let now = Utc::now();
        let mut tracker = VelocityTracker::new_at(0.0, 1.0, now);
        tracker.record_event_at(now);
        let one = tracker.penalty_at(now);
        tracker.record_event_at(now);
        assert!(tracker.penalty_at(now) > one);
        assert!((one - DEFAULT_VELOCITY_INCREMENT).abs() < 1e-12);
    }

    #[test]
    fn test_wall_clock_decay_halves_per_half_life() {
        let (mut tracker, now) = tracker();
        tracker.record_event_at(now);
        let later = tracker.penalty_at(now + Duration::hours(1));
        assert!((later - 0.025).abs() < 1e-9);
        assert!(tracker.penalty_at(now + Duration::hours(48)) >= 0.0);
    }

    #[test]
    fn test_explicit_decay_strictly_reduces() {
        let (mut tracker, now) = tracker();
        tracker.record_event_at(now);
        tracker.record_event_at(now);
        let before = tracker.penalty_at(now);
        tracker.decay(0.5);
        let after = tracker.penalty_at(now);
        assert!(after < before);
        assert!(after > 0.0);
    }

    #[test]
    fn test_decay_ignores_non_positive_hours() {
        let (mut tracker, now) = tracker();
        tracker.record_event_at(now);
        tracker.decay(0.0);
        tracker.decay(-2.0);
        tracker.decay(f64::NAN);
        assert!((tracker.penalty_at(now) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_reset_zeroes_penalty() {
        let (mut tracker, now) = tracker();
        tracker.record_event_at(now);
        tracker.reset();
        assert_eq!(tracker.penalty(), 0.0);
    }
}
