//! Charging session time tracking
//!
//! The charger only reports an instantaneous vehicle code, so the elapsed
//! charging time of the current session is accumulated on this side from
//! poll to poll. Wall-clock time between two consecutive polls is counted
//! only when the vehicle was charging across the whole interval, which
//! keeps a single "charging" sample between two idle polls from inflating
//! the session.

use std::time::Instant;

/// Vehicle code the charger reports while current is flowing
pub const VEHICLE_CHARGING: u8 = 2;

/// Accumulates the elapsed time of the current charging session
#[derive(Debug)]
pub struct ChargeSessionTracker {
    elapsed_secs: u64,
    previous_code: Option<u8>,
    last_poll: Option<Instant>,
}

impl Default for ChargeSessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChargeSessionTracker {
    /// Create a tracker with no session in progress
    pub fn new() -> Self {
        Self {
            elapsed_secs: 0,
            previous_code: None,
            last_poll: None,
        }
    }

    /// Feed one poll result and return the session time to publish.
    pub fn update(&mut self, vehicle_code: u8) -> u64 {
        self.update_at(vehicle_code, Instant::now())
    }

    /// Like [`update`](Self::update) but with an explicit poll timestamp.
    ///
    /// Time is only added when both this poll and the previous one saw the
    /// vehicle charging. A "ready" vehicle (code 1, nothing connected or a
    /// fresh plug-in) resets the counter; waiting and finished codes freeze
    /// it so a paused session resumes without counting the gap.
    pub fn update_at(&mut self, vehicle_code: u8, now: Instant) -> u64 {
        match vehicle_code {
            VEHICLE_CHARGING => {
                if self.previous_code == Some(VEHICLE_CHARGING)
                    && let Some(last) = self.last_poll
                {
                    self.elapsed_secs += now.duration_since(last).as_secs();
                }
            }
            1 => self.elapsed_secs = 0,
            _ => {}
        }

        self.previous_code = Some(vehicle_code);
        self.last_poll = Some(now);
        self.elapsed_secs
    }

    /// Session time published by the most recent poll
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Whether the last poll saw the vehicle charging
    pub fn is_charging(&self) -> bool {
        self.previous_code == Some(VEHICLE_CHARGING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn charging_time_accumulates_between_charging_polls() {
        let mut tracker = ChargeSessionTracker::new();
        let t0 = Instant::now();
        let at = |s: u64| t0 + Duration::from_secs(s);

        // ready, charging, charging, charging, ready at 10 s spacing
        assert_eq!(tracker.update_at(1, at(0)), 0);
        assert_eq!(tracker.update_at(2, at(10)), 0);
        assert_eq!(tracker.update_at(2, at(20)), 10);
        assert_eq!(tracker.update_at(2, at(30)), 20);
        assert_eq!(tracker.update_at(1, at(40)), 0);
    }

    #[test]
    fn waiting_freezes_then_charging_resumes() {
        let mut tracker = ChargeSessionTracker::new();
        let t0 = Instant::now();
        let at = |s: u64| t0 + Duration::from_secs(s);

        tracker.update_at(2, at(0));
        tracker.update_at(2, at(5));
        assert_eq!(tracker.elapsed_secs(), 5);
        assert!(tracker.is_charging());

        // Vehicle waits; the paused span is not counted
        assert_eq!(tracker.update_at(3, at(10)), 5);
        assert!(!tracker.is_charging());
        assert_eq!(tracker.update_at(2, at(15)), 5);
        assert_eq!(tracker.update_at(2, at(18)), 8);
    }

    #[test]
    fn ready_resets_session() {
        let mut tracker = ChargeSessionTracker::new();
        let t0 = Instant::now();
        let at = |s: u64| t0 + Duration::from_secs(s);

        tracker.update_at(2, at(0));
        tracker.update_at(2, at(5));
        tracker.update_at(4, at(10));
        assert_eq!(tracker.elapsed_secs(), 5);

        // Unplugging ends the session
        assert_eq!(tracker.update_at(1, at(15)), 0);
        assert_eq!(tracker.update_at(2, at(20)), 0);
        assert_eq!(tracker.update_at(2, at(23)), 3);
    }

    #[test]
    fn first_poll_while_charging_counts_from_zero() {
        let mut tracker = ChargeSessionTracker::new();
        let t0 = Instant::now();

        // No previous poll, so nothing to accumulate yet
        assert_eq!(tracker.update_at(2, t0), 0);
        assert_eq!(tracker.update_at(2, t0 + Duration::from_secs(7)), 7);
    }
}
