use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use kiosk_overlay::overlay::clocks::parse_clock_spec;
use kiosk_overlay::overlay::signature::signature;
use kiosk_overlay::overlay::{
    render, EventKind, InfoCard, OverlayStateManager, OverlayTheme, RenderOptions,
};
use serde_json::{json, Value};

fn busy_schedule(entries: usize) -> Value {
    let now = Utc::now();
    let timers: Vec<Value> = (0..entries)
        .map(|i| {
            json!({
                "id": format!("t{i}"),
                "label": format!("Timer {i}"),
                "next_fire": (now + Duration::seconds(60 * i as i64 + 30)).to_rfc3339(),
            })
        })
        .collect();
    let alarms: Vec<Value> = (0..entries)
        .map(|i| json!({"id": format!("a{i}"), "label": format!("Alarm {i}"), "target": now.timestamp() + 3600 * i as i64}))
        .collect();
    json!({"timers": timers, "alarms": alarms, "reminders": [], "events": []})
}

fn bench_render(c: &mut Criterion) {
    let mgr = OverlayStateManager::new(parse_clock_spec(
        "local,Europe/London,Asia/Tokyo,America/New_York",
        4,
        "Local",
    ));
    let schedule = busy_schedule(50);
    mgr.update_schedule_snapshot(&schedule);
    mgr.update_now_playing("Miles Davis - So What");
    mgr.update_active_event(
        EventKind::Alarm,
        &json!({"state": "ringing", "event": {"id": "a0", "label": "Alarm 0"}}),
    );
    let items = schedule["alarms"].as_array().cloned().unwrap_or_default();
    mgr.update_info_card(Some(InfoCard::listing("alarms", "Alarms", items)));

    let snapshot = mgr.snapshot();
    let theme = OverlayTheme::default();
    let options = RenderOptions::default();
    c.bench_function("render_busy_overlay", |b| {
        b.iter(|| render(&snapshot, &theme, &options))
    });

    c.bench_function("signature_schedule_50", |b| b.iter(|| signature(&schedule)));

    c.bench_function("schedule_update_unchanged", |b| {
        b.iter(|| mgr.update_schedule_snapshot(&schedule))
    });
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
