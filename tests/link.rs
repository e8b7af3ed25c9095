mod common;

use common::*;
use sensornode::network::error::LinkError;
use sensornode::network::link::{DEFAULT_POLL_INTERVAL_MS, LinkSupervisor};

#[test]
fn test_ensure_up_when_already_connected_only_queries_status() {
    let world = link_up_world();
    let mut link = supervisor(&world);
    let mut clock = ManualClock::default();

    link.ensure_up(&mut clock);

    assert_eq!(world.borrow().calls, vec![Call::StationStatus]);
    assert!(clock.delays.is_empty());
    assert_eq!(link.attempts(), 0);
}

#[test]
fn test_ensure_up_starts_clean_and_polls_until_associated() {
    let world = world();
    {
        let mut w = world.borrow_mut();
        w.associate_on_begin = 1;
        w.polls_to_associate = 3;
    }
    let mut link = supervisor(&world);
    let mut clock = ManualClock::default();

    link.ensure_up(&mut clock);

    assert!(link.is_up());
    assert_eq!(link.attempts(), 1);
    assert_eq!(clock.now, 3 * u64::from(DEFAULT_POLL_INTERVAL_MS));

    let calls = world.borrow().calls.clone();
    assert_eq!(calls[0], Call::StationStatus);
    assert_eq!(calls[1], Call::StationDisconnect);
    assert_eq!(
        calls[2],
        Call::StationBegin {
            ssid: "plant-floor".into(),
            secret: "hunter22".into(),
        }
    );
}

#[test]
fn test_ensure_up_rearms_window_after_timeout() {
    let world = world();
    {
        let mut w = world.borrow_mut();
        w.associate_on_begin = 2;
        w.polls_to_associate = 2;
    }
    let config = link_config().with_timing(3_000, 1_000);
    let mut link = LinkSupervisor::new(MockStation(world.clone()), config);
    let mut clock = ManualClock::default();

    link.ensure_up(&mut clock);

    // Three polls in the first window, two in the second.
    assert_eq!(link.attempts(), 2);
    assert_eq!(clock.now, 5_000);
    let w = world.borrow();
    let begins = w
        .calls
        .iter()
        .filter(|c| matches!(c, Call::StationBegin { .. }))
        .count();
    let disconnects = w
        .calls
        .iter()
        .filter(|c| matches!(c, Call::StationDisconnect))
        .count();
    assert_eq!(begins, 2);
    assert_eq!(disconnects, 2);
}

#[test]
fn test_try_connect_bounded_by_window() {
    let world = world();
    let config = link_config().with_timing(2_500, 1_000);
    let mut link = LinkSupervisor::new(MockStation(world.clone()), config);
    let mut clock = ManualClock::default();

    assert_eq!(link.try_connect(&mut clock), Err(LinkError::Timeout));
    assert_eq!(clock.now, 3_000);
    assert!(!link.is_up());
}

#[test]
fn test_zero_window_still_polls_once() {
    let world = world();
    let config = link_config().with_timing(0, 1_000);
    let mut link = LinkSupervisor::new(MockStation(world.clone()), config);
    let mut clock = ManualClock::default();

    assert_eq!(link.try_connect(&mut clock), Err(LinkError::Timeout));
    assert_eq!(clock.delays, vec![1_000]);
    let w = world.borrow();
    let statuses = w
        .calls
        .iter()
        .filter(|c| matches!(c, Call::StationStatus))
        .count();
    // One before the attempt, one inside the window.
    assert_eq!(statuses, 2);
}

#[test]
fn test_ensure_up_with_zero_window_associates() {
    let world = world();
    {
        let mut w = world.borrow_mut();
        w.associate_on_begin = 1;
        w.polls_to_associate = 1;
    }
    let config = link_config().with_timing(0, 1_000);
    let mut link = LinkSupervisor::new(MockStation(world.clone()), config);
    let mut clock = ManualClock::default();

    link.ensure_up(&mut clock);

    assert!(link.is_up());
    assert_eq!(link.attempts(), 1);
    assert_eq!(clock.now, 1_000);
}

#[test]
fn test_try_connect_station_refuses() {
    let world = world();
    world.borrow_mut().begin_fails = true;
    let mut link = supervisor(&world);
    let mut clock = ManualClock::default();

    assert_eq!(link.try_connect(&mut clock), Err(LinkError::Station));
    assert_eq!(clock.delays, vec![DEFAULT_POLL_INTERVAL_MS]);
    assert_eq!(link.attempts(), 1);
}

#[test]
fn test_try_connect_when_up_is_free() {
    let world = link_up_world();
    let mut link = supervisor(&world);
    let mut clock = ManualClock::default();

    assert_eq!(link.try_connect(&mut clock), Ok(()));
    assert_eq!(link.attempts(), 0);
    assert_eq!(clock.now, 0);
}
