use helios::session::ChargeSessionTracker;
use std::time::{Duration, Instant};

fn clock() -> impl Fn(u64) -> Instant {
    let t0 = Instant::now();
    move |s| t0 + Duration::from_secs(s)
}

#[test]
fn full_session_lifecycle() {
    let at = clock();
    let mut tracker = ChargeSessionTracker::new();

    // Station idle
    assert_eq!(tracker.update_at(1, at(0)), 0);
    assert_eq!(tracker.update_at(1, at(10)), 0);

    // Vehicle plugs in and charges for three polls
    assert_eq!(tracker.update_at(2, at(20)), 0);
    assert_eq!(tracker.update_at(2, at(30)), 10);
    assert_eq!(tracker.update_at(2, at(40)), 20);

    // Vehicle pauses (waiting), duration holds
    assert_eq!(tracker.update_at(3, at(50)), 20);
    assert_eq!(tracker.update_at(3, at(60)), 20);

    // Charging resumes; the paused minute is not counted
    assert_eq!(tracker.update_at(2, at(70)), 20);
    assert_eq!(tracker.update_at(2, at(80)), 30);

    // Charge finishes, vehicle still connected
    assert_eq!(tracker.update_at(4, at(90)), 30);

    // Vehicle unplugs, session gone
    assert_eq!(tracker.update_at(1, at(100)), 0);
}

#[test]
fn single_charging_poll_between_idle_polls_adds_nothing() {
    let at = clock();
    let mut tracker = ChargeSessionTracker::new();

    tracker.update_at(1, at(0));
    assert_eq!(tracker.update_at(2, at(10)), 0);
    assert_eq!(tracker.update_at(1, at(20)), 0);
}

#[test]
fn out_of_contract_code_freezes_duration() {
    let at = clock();
    let mut tracker = ChargeSessionTracker::new();

    tracker.update_at(2, at(0));
    tracker.update_at(2, at(10));
    assert_eq!(tracker.elapsed_secs(), 10);

    // The device should never report this, but if it does the session
    // neither grows nor resets
    assert_eq!(tracker.update_at(9, at(20)), 10);
    assert_eq!(tracker.update_at(2, at(30)), 10);
    assert_eq!(tracker.update_at(2, at(40)), 20);
}

#[test]
fn uneven_poll_spacing_truncates_to_whole_seconds() {
    let t0 = Instant::now();
    let mut tracker = ChargeSessionTracker::new();

    tracker.update_at(2, t0);
    let published = tracker.update_at(2, t0 + Duration::from_millis(2500));
    assert_eq!(published, 2);
}
