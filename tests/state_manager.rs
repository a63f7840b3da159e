use kiosk_overlay::overlay::clocks::parse_clock_spec;
use kiosk_overlay::overlay::{ClockConfig, EventKind, InfoCard, OverlayStateManager};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn manager() -> OverlayStateManager {
    OverlayStateManager::new(parse_clock_spec("local", 4, "Local"))
}

#[test]
fn repeated_identical_updates_bump_version_once() {
    let mgr = manager();
    let schedule = json!({
        "timers": [{"id": "t1", "label": "Pasta", "next_fire": "2030-01-01T12:00:00Z"}],
        "alarms": [{"id": "a1", "name": "Wake", "target": 1_900_000_000}],
    });
    let notifications = vec![json!({"title": "Doorbell"})];
    let ringing = json!({"state": "ringing", "event": {"id": "a1", "label": "Wake"}});
    let card = InfoCard::listing("alarms", "Alarms", vec![json!({"label": "Wake"})]);
    let clocks = parse_clock_spec("Europe/London,Asia/Tokyo", 4, "Local");

    let steps: Vec<Box<dyn Fn() -> kiosk_overlay::overlay::OverlayChange>> = vec![
        Box::new(|| mgr.update_now_playing("Blue in Green")),
        Box::new(|| mgr.update_schedule_snapshot(&schedule)),
        Box::new(|| mgr.update_notifications(&notifications)),
        Box::new(|| mgr.update_active_event(EventKind::Alarm, &ringing)),
        Box::new(|| mgr.update_active_event(EventKind::Timer, &json!({"state": "active"}))),
        Box::new(|| mgr.update_info_card(Some(card.clone()))),
        Box::new(|| mgr.configure_clocks(clocks.clone())),
    ];

    for (idx, step) in steps.iter().enumerate() {
        let first = step();
        assert!(first.changed, "step {idx} should change state");
        assert_eq!(first.version, idx as u64 + 1);
        for _ in 0..3 {
            let again = step();
            assert!(!again.changed, "step {idx} repeated should be a no-op");
            assert_eq!(again.version, first.version);
        }
    }
    assert_eq!(mgr.version(), steps.len() as u64);
}

#[test]
fn change_reports_reason_and_snapshot_tracks_last_reason() {
    let mgr = manager();
    let change = mgr.update_schedule_snapshot(&json!({"timers": [], "alarms": []}));
    assert_eq!(change.reason, "schedules");
    mgr.update_now_playing("News");
    assert_eq!(mgr.snapshot().last_reason, "now_playing");
}

#[test]
fn snapshots_do_not_share_storage() {
    let mgr = manager();
    mgr.update_schedule_snapshot(&json!({
        "timers": [{"label": "Tea", "next_fire": 2_000_000_000}],
        "alarms": [],
        "reminders": [{"label": "Call mum"}],
    }));
    mgr.update_notifications(&[json!({"title": "Mail"})]);

    let before = mgr.snapshot();
    let mut scratch = mgr.snapshot();
    scratch.clocks[0].label = "Changed".into();
    scratch.timers.clear();
    scratch.notifications[0].insert("title".into(), json!("Spam"));
    if let Some(Value::Object(raw)) = scratch.schedule_snapshot.as_mut() {
        raw.insert("reminders".into(), json!([]));
    }
    scratch.now_playing.push_str("garbage");

    let mut after = mgr.snapshot();
    after.generated_at = before.generated_at;
    assert_eq!(after, before);
}

#[test]
fn empty_clock_list_leaves_clocks_untouched() {
    let mgr = OverlayStateManager::new(parse_clock_spec("local,Asia/Tokyo", 4, "Local"));
    let before = mgr.snapshot().clocks;
    let change = mgr.configure_clocks(Vec::new());
    assert!(!change.changed);
    assert_eq!(mgr.snapshot().clocks, before);
}

#[test]
fn configure_clocks_keeps_first_four_in_order() {
    let mgr = manager();
    let clocks = parse_clock_spec(
        "local,Europe/London,Asia/Tokyo,America/New_York,Australia/Sydney,Europe/Berlin",
        8,
        "Local",
    );
    assert_eq!(clocks.len(), 6);
    mgr.configure_clocks(clocks.clone());
    let stored = mgr.snapshot().clocks;
    assert_eq!(stored, clocks[..4].to_vec());
}

#[test]
fn configure_clocks_compares_by_value() {
    let mgr = OverlayStateManager::new(vec![ClockConfig::local("clock0", "Local")]);
    let change = mgr.configure_clocks(vec![ClockConfig::local("clock0", "Local")]);
    assert!(!change.changed);
}

#[test]
fn active_alarm_set_and_cleared_by_state() {
    let mgr = manager();
    mgr.update_active_event(
        EventKind::Alarm,
        &json!({"state": "ringing", "event": {"label": "Wake"}}),
    );
    let alarm = mgr.snapshot().active_alarm.expect("alarm should be set");
    assert_eq!(alarm.label(), Some("Wake"));

    let change = mgr.update_active_event(EventKind::Alarm, &json!({"state": "idle"}));
    assert!(change.changed);
    assert!(mgr.snapshot().active_alarm.is_none());
}

#[test]
fn past_and_unparsable_entries_are_stored_verbatim() {
    let mgr = manager();
    mgr.update_schedule_snapshot(&json!({
        "timers": [
            {"label": "Old", "next_fire": "2001-01-01T00:00:00"},
            {"label": "Broken", "next_fire": "whenever"},
        ],
        "alarms": [{"label": "No time"}],
    }));
    let snap = mgr.snapshot();
    assert_eq!(snap.timers.len(), 2);
    assert_eq!(snap.timers[1].get("next_fire"), Some(&json!("whenever")));
    assert_eq!(snap.alarms.len(), 1);
}

#[test]
fn concurrent_producers_each_bump_exactly_once() {
    let mgr = Arc::new(manager());
    let writers: Vec<_> = (0..8)
        .map(|i| {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || {
                let payload = json!({"timers": [{"label": format!("t{i}")}]});
                let first = mgr.update_schedule_snapshot(&payload);
                let second = mgr.update_schedule_snapshot(&payload);
                (first, second)
            })
        })
        .collect();

    let reader = {
        let mgr = Arc::clone(&mgr);
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..500 {
                let version = mgr.snapshot().version;
                assert!(version >= last, "version went backwards");
                last = version;
            }
        })
    };

    let mut versions = HashSet::new();
    for handle in writers {
        let (first, _) = handle.join().unwrap();
        assert!(first.changed);
        versions.insert(first.version);
    }
    reader.join().unwrap();

    assert_eq!(versions.len(), 8, "each change gets its own version");
    // A writer's repeat can only be a change if another writer got in between.
    assert!(mgr.version() >= 8);
    assert!(mgr.version() <= 16);
}
