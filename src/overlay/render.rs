//! Turns an [`OverlaySnapshot`] into a self-contained HTML document.
//!
//! The page is a fixed 3x3 grid of named cells. Everything time-sensitive is
//! decided here against `snapshot.generated_at`; the embedded script only
//! advances clock faces and countdowns between reloads.

use crate::overlay::clocks::ClockConfig;
use crate::overlay::model::{ActiveEvent, ActiveState, InfoCard, ScheduleEntry};
use crate::overlay::state::OverlaySnapshot;
use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

pub const CELLS: [&str; 9] = [
    "top-left",
    "top-center",
    "top-right",
    "middle-left",
    "center",
    "middle-right",
    "bottom-left",
    "bottom-center",
    "bottom-right",
];

const CLOCK_LAYOUTS: [&[&str]; 4] = [
    &["center"],
    &["middle-left", "middle-right"],
    &["top-left", "top-right", "middle-left"],
    &["top-left", "top-right", "middle-left", "middle-right"],
];

const TIMER_LAYOUTS: [&[&str]; 3] = [
    &["bottom-left"],
    &["bottom-left", "top-center"],
    &["bottom-left", "top-center", "bottom-center"],
];

const ACTIVE_ALARM_CELL: &str = "center";
const ACTIVE_TIMER_CELL: &str = "bottom-center";
const NOW_PLAYING_CELL: &str = "bottom-right";

pub const DEFAULT_SNOOZE_MINUTES: u32 = 5;
pub const DEFAULT_DELAY_SECONDS: u64 = 3600;

/// Styling constants for the rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayTheme {
    pub background: String,
    pub foreground: String,
    pub muted: String,
    pub accent: String,
    pub card_background: String,
    pub card_border: String,
    pub alarm_color: String,
    pub timer_color: String,
    pub badge_background: String,
    pub font_family: String,
    pub show_notification_bar: bool,
}

impl Default for OverlayTheme {
    fn default() -> Self {
        Self {
            background: "transparent".into(),
            foreground: "#f5f6fa".into(),
            muted: "#a4a8b8".into(),
            accent: "#4fc3f7".into(),
            card_background: "rgba(12, 14, 22, 0.72)".into(),
            card_border: "rgba(255, 255, 255, 0.12)".into(),
            alarm_color: "#ff5252".into(),
            timer_color: "#ffb74d".into(),
            badge_background: "rgba(255, 255, 255, 0.14)".into(),
            font_family: "'Inter', 'Segoe UI', sans-serif".into(),
            show_notification_bar: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub clock_24h: bool,
    pub stop_endpoint: String,
    pub info_endpoint: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            clock_24h: true,
            stop_endpoint: "/overlay/stop".into(),
            info_endpoint: "/overlay/info-card".into(),
        }
    }
}

/// Cells for `count` cards. Counts past the end of `table` reuse its last
/// row, wrapping around when there are more cards than cells.
fn layout_cells(table: &[&[&'static str]], count: usize) -> Vec<&'static str> {
    if count == 0 || table.is_empty() {
        return Vec::new();
    }
    let row = table[count.min(table.len()) - 1];
    (0..count).map(|idx| row[idx % row.len()]).collect()
}

pub fn clock_cells(count: usize) -> Vec<&'static str> {
    layout_cells(&CLOCK_LAYOUTS, count)
}

pub fn timer_cells(count: usize) -> Vec<&'static str> {
    layout_cells(&TIMER_LAYOUTS, count)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

// Theme values land inside a <style> block.
fn css_value(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}' | ';'))
        .collect()
}

fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {singular}")
    } else {
        format!("{count} {plural}")
    }
}

fn zone_offset(clock: &ClockConfig, now: DateTime<Utc>) -> FixedOffset {
    match clock.tz() {
        Some(tz) => now.with_timezone(&tz).offset().fix(),
        None => now.with_timezone(&Local).offset().fix(),
    }
}

fn local_offset(now: DateTime<Utc>) -> FixedOffset {
    now.with_timezone(&Local).offset().fix()
}

fn format_time(at: &DateTime<FixedOffset>, clock_24h: bool) -> String {
    if clock_24h {
        at.format("%H:%M").to_string()
    } else {
        at.format("%-I:%M %p").to_string()
    }
}

/// `MM:SS`, or `H:MM:SS` once an hour or more remains.
pub fn format_countdown(remaining_secs: i64) -> String {
    let secs = remaining_secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

fn remaining_secs(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (at - now).num_milliseconds();
    (millis + 500) / 1000
}

struct ActionButton<'a> {
    endpoint: &'a str,
    action: &'static str,
    label: &'static str,
    event_id: Option<&'a str>,
    extra: Option<(&'static str, String)>,
}

impl<'a> ActionButton<'a> {
    fn new(endpoint: &'a str, action: &'static str, label: &'static str) -> Self {
        Self {
            endpoint,
            action,
            label,
            event_id: None,
            extra: None,
        }
    }

    fn event(mut self, event_id: &'a str) -> Self {
        self.event_id = Some(event_id);
        self
    }

    fn extra(mut self, name: &'static str, value: String) -> Self {
        self.extra = Some((name, value));
        self
    }

    fn write(&self, out: &mut String) {
        let _ = write!(
            out,
            r#"<button type="button" class="action" data-endpoint="{}" data-action="{}""#,
            escape_html(self.endpoint),
            self.action
        );
        if let Some(id) = self.event_id {
            let _ = write!(out, r#" data-event-id="{}""#, escape_html(id));
        }
        if let Some((name, value)) = &self.extra {
            let _ = write!(out, r#" data-{}="{}""#, name, escape_html(value));
        }
        let _ = write!(out, ">{}</button>", self.label);
    }
}

fn clock_card(clock: &ClockConfig, now: DateTime<Utc>, options: &RenderOptions) -> String {
    let offset = zone_offset(clock, now);
    let local = now.with_timezone(&offset);
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="card clock-card" data-kind="clock" data-key="{key}"><div class="clock-label">{label}</div><div class="clock-time" data-offset-ms="{offset_ms}" data-format="{format}">{time}</div><div class="clock-date">{date}</div></div>"#,
        key = escape_html(&clock.key),
        label = escape_html(&clock.label),
        offset_ms = i64::from(offset.local_minus_utc()) * 1000,
        format = if options.clock_24h { "24" } else { "12" },
        time = format_time(&local, options.clock_24h),
        date = local.format("%a %-d %b"),
    );
    out
}

fn timer_card(timer: &ScheduleEntry, at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="card timer-card" data-kind="timer""#
    );
    if let Some(id) = timer.id() {
        let _ = write!(out, r#" data-id="{}""#, escape_html(&id));
    }
    let _ = write!(
        out,
        r#"><div class="timer-label">{}</div><div class="countdown" data-target-ms="{}">{}</div></div>"#,
        escape_html(timer.label().unwrap_or("Timer")),
        at.timestamp_millis(),
        format_countdown(remaining_secs(at, now)),
    );
    out
}

fn active_alarm_card(event: &ActiveEvent, options: &RenderOptions) -> String {
    let pulse = if event.state == ActiveState::Ringing {
        " pulse"
    } else {
        ""
    };
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="card alarm-card{pulse}" data-kind="active-alarm" data-state="{}"><div class="alarm-title">{}</div>"#,
        event.state.as_str(),
        escape_html(event.label().unwrap_or("Alarm")),
    );
    if let Some(id) = event.event_id() {
        out.push_str(r#"<div class="actions">"#);
        ActionButton::new(&options.stop_endpoint, "stop", "Stop")
            .event(&id)
            .write(&mut out);
        ActionButton::new(&options.stop_endpoint, "snooze", "Snooze")
            .event(&id)
            .extra("minutes", DEFAULT_SNOOZE_MINUTES.to_string())
            .write(&mut out);
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

fn active_timer_card(event: &ActiveEvent, options: &RenderOptions) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="card timer-done-card pulse" data-kind="active-timer" data-state="{}"><div class="timer-label">Time's up</div><div class="timer-done-name">{}</div>"#,
        event.state.as_str(),
        escape_html(event.label().unwrap_or("Timer")),
    );
    if let Some(id) = event.event_id() {
        out.push_str(r#"<div class="actions">"#);
        ActionButton::new(&options.stop_endpoint, "stop", "Stop")
            .event(&id)
            .write(&mut out);
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

fn now_playing_card(text: &str) -> String {
    format!(
        r#"<div class="card now-playing-card" data-kind="now-playing"><div class="now-playing-label">Now playing</div><div class="now-playing-text">{}</div></div>"#,
        escape_html(text)
    )
}

fn info_card_item_buttons(
    card: &InfoCard,
    item: &ScheduleEntry,
    id: &str,
    options: &RenderOptions,
    out: &mut String,
) {
    let endpoint = options.info_endpoint.as_str();
    match card.kind() {
        "alarms" => {
            if item.is_paused() {
                ActionButton::new(endpoint, "resume_alarm", "Resume")
                    .event(id)
                    .write(out);
            } else {
                ActionButton::new(endpoint, "pause_alarm", "Pause")
                    .event(id)
                    .write(out);
            }
            ActionButton::new(endpoint, "delete_alarm", "Delete")
                .event(id)
                .write(out);
        }
        "reminders" => {
            ActionButton::new(endpoint, "complete_reminder", "Done")
                .event(id)
                .write(out);
            ActionButton::new(endpoint, "delay_reminder", "Later")
                .event(id)
                .extra("seconds", DEFAULT_DELAY_SECONDS.to_string())
                .write(out);
            ActionButton::new(endpoint, "delete_reminder", "Delete")
                .event(id)
                .write(out);
        }
        _ => {}
    }
}

fn info_card_view(card: &InfoCard, now: DateTime<Utc>, options: &RenderOptions) -> String {
    let offset = local_offset(now);
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="info-card" data-kind="info-card" data-type="{}"><div class="info-header"><span class="info-title">{}</span>"#,
        escape_html(card.kind()),
        escape_html(card.title().unwrap_or("Info")),
    );
    ActionButton::new(&options.info_endpoint, "clear", "Close").write(&mut out);
    out.push_str("</div>");

    if let Some(body) = card.body() {
        let _ = write!(out, r#"<p class="info-body">{}</p>"#, escape_html(body));
    }

    let items = card.items();
    if items.is_empty() {
        if card.body().is_none() {
            out.push_str(r#"<p class="info-empty">Nothing scheduled</p>"#);
        }
    } else {
        out.push_str(r#"<ul class="info-items">"#);
        for item in &items {
            out.push_str(r#"<li class="info-item">"#);
            let _ = write!(
                out,
                r#"<span class="item-label">{}</span>"#,
                escape_html(item.label().unwrap_or("Untitled"))
            );
            if let Some(at) = item.fire_at() {
                let local = at.with_timezone(&offset);
                let _ = write!(
                    out,
                    r#"<span class="item-time">{} {}</span>"#,
                    local.format("%a"),
                    format_time(&local, options.clock_24h)
                );
            }
            if let Some(id) = item.id() {
                out.push_str(r#"<span class="item-actions">"#);
                info_card_item_buttons(card, item, &id, options, &mut out);
                out.push_str("</span>");
            }
            out.push_str("</li>");
        }
        out.push_str("</ul>");
    }
    out.push_str("</div>");
    out
}

fn notification_badges(snapshot: &OverlaySnapshot, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let mut badges = Vec::new();
    if let Some(alarm) = &snapshot.active_alarm {
        if alarm.state == ActiveState::Ringing {
            badges.push(("ringing", "Alarm ringing".to_string()));
        }
    }
    let upcoming_alarms = snapshot.alarms.iter().filter(|a| a.is_future(now)).count();
    if upcoming_alarms > 0 {
        badges.push(("alarms", pluralize(upcoming_alarms, "alarm", "alarms")));
    }
    let active_timers = snapshot.timers.iter().filter(|t| t.is_future(now)).count();
    if active_timers > 0 {
        badges.push(("timers", pluralize(active_timers, "timer", "timers")));
    }
    if !snapshot.notifications.is_empty() {
        badges.push((
            "notifications",
            pluralize(snapshot.notifications.len(), "notification", "notifications"),
        ));
    }
    if !snapshot.now_playing.is_empty() {
        badges.push(("now-playing", "Now playing".to_string()));
    }
    badges
}

fn stylesheet(theme: &OverlayTheme) -> String {
    format!(
        r#"*{{box-sizing:border-box;margin:0;padding:0}}
html,body{{width:100%;height:100%;overflow:hidden;background:{background};color:{foreground};font-family:{font}}}
.overlay-grid{{display:grid;grid-template-columns:repeat(3,1fr);grid-template-rows:repeat(3,1fr);grid-template-areas:"top-left top-center top-right" "middle-left center middle-right" "bottom-left bottom-center bottom-right";width:100%;height:100%;padding:2vmin;gap:2vmin}}
.cell{{display:flex;flex-direction:column;align-items:center;justify-content:center;gap:1.5vmin}}
{areas}
.card{{background:{card_bg};border:1px solid {card_border};border-radius:2vmin;padding:2vmin 3vmin;text-align:center;min-width:30vmin}}
.clock-label,.timer-label,.now-playing-label{{color:{muted};font-size:2.4vmin;text-transform:uppercase;letter-spacing:.1em}}
.clock-time{{font-size:9vmin;font-weight:600;font-variant-numeric:tabular-nums}}
.clock-date{{color:{muted};font-size:2.6vmin}}
.timer-card .countdown{{color:{timer};font-size:7vmin;font-variant-numeric:tabular-nums}}
.alarm-card{{border-color:{alarm}}}
.alarm-title{{color:{alarm};font-size:6vmin;font-weight:700}}
.timer-done-card{{border-color:{timer}}}
.timer-done-name{{color:{timer};font-size:5vmin}}
.now-playing-text{{font-size:3.2vmin;color:{accent}}}
.pulse{{animation:pulse 1.2s ease-in-out infinite}}
@keyframes pulse{{0%,100%{{transform:scale(1);opacity:1}}50%{{transform:scale(1.05);opacity:.75}}}}
.actions,.item-actions{{display:flex;gap:1.5vmin;justify-content:center;margin-top:1.5vmin}}
.action{{background:{badge_bg};color:{foreground};border:1px solid {card_border};border-radius:1vmin;padding:1vmin 2.5vmin;font-size:2.6vmin}}
.info-card{{position:fixed;top:10vh;left:15vw;width:70vw;max-height:75vh;overflow:auto;background:{card_bg};border:1px solid {accent};border-radius:2vmin;padding:3vmin}}
.info-header{{display:flex;justify-content:space-between;align-items:center;font-size:4vmin;margin-bottom:2vmin}}
.info-items{{list-style:none}}
.info-item{{display:flex;gap:2vmin;align-items:center;justify-content:space-between;padding:1vmin 0;border-bottom:1px solid {card_border};font-size:3vmin}}
.item-time,.info-empty{{color:{muted}}}
.notification-bar{{position:fixed;bottom:0;left:0;right:0;display:flex;gap:1.5vmin;justify-content:center;padding:1vmin}}
.badge{{background:{badge_bg};border-radius:999px;padding:.5vmin 2vmin;font-size:2.2vmin}}
.badge-ringing{{background:{alarm}}}
"#,
        background = css_value(&theme.background),
        foreground = css_value(&theme.foreground),
        font = css_value(&theme.font_family),
        muted = css_value(&theme.muted),
        accent = css_value(&theme.accent),
        card_bg = css_value(&theme.card_background),
        card_border = css_value(&theme.card_border),
        alarm = css_value(&theme.alarm_color),
        timer = css_value(&theme.timer_color),
        badge_bg = css_value(&theme.badge_background),
        areas = CELLS
            .iter()
            .map(|cell| format!(r#"[data-cell="{cell}"]{{grid-area:{cell}}}"#))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

const TICK_SCRIPT: &str = r#"(function () {
  function pad(n) { return n < 10 ? '0' + n : '' + n; }
  function tickClock(el) {
    var offset = parseInt(el.getAttribute('data-offset-ms'), 10) || 0;
    var d = new Date(Date.now() + offset);
    var h = d.getUTCHours(), m = d.getUTCMinutes();
    if (el.getAttribute('data-format') === '12') {
      var suffix = h < 12 ? 'AM' : 'PM';
      h = h % 12;
      if (h === 0) { h = 12; }
      el.textContent = h + ':' + pad(m) + ' ' + suffix;
    } else {
      el.textContent = pad(h) + ':' + pad(m);
    }
  }
  function tickCountdown(el) {
    var target = parseInt(el.getAttribute('data-target-ms'), 10);
    if (isNaN(target)) { return; }
    var left = Math.max(0, Math.round((target - Date.now()) / 1000));
    var h = Math.floor(left / 3600), m = Math.floor((left % 3600) / 60), s = left % 60;
    el.textContent = (h > 0 ? h + ':' + pad(m) : pad(m)) + ':' + pad(s);
  }
  function tick() {
    document.querySelectorAll('[data-offset-ms]').forEach(tickClock);
    document.querySelectorAll('[data-target-ms]').forEach(tickCountdown);
  }
  tick();
  setInterval(tick, 1000);
  document.addEventListener('click', function (ev) {
    var btn = ev.target.closest('[data-action]');
    if (!btn) { return; }
    var payload = { action: btn.getAttribute('data-action') };
    var id = btn.getAttribute('data-event-id');
    if (id) { payload.event_id = id; }
    ['minutes', 'seconds'].forEach(function (key) {
      var v = btn.getAttribute('data-' + key);
      if (v) { payload[key] = Number(v); }
    });
    fetch(btn.getAttribute('data-endpoint'), {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(payload)
    }).finally(function () { window.location.reload(); });
  });
})();"#;

/// Render a full HTML document for `snapshot`.
pub fn render(snapshot: &OverlaySnapshot, theme: &OverlayTheme, options: &RenderOptions) -> String {
    let now = snapshot.generated_at;
    let mut cells: HashMap<&'static str, Vec<String>> = HashMap::new();

    for (clock, cell) in snapshot.clocks.iter().zip(clock_cells(snapshot.clocks.len())) {
        cells.entry(cell).or_default().push(clock_card(clock, now, options));
    }

    let mut timers: Vec<(&ScheduleEntry, DateTime<Utc>)> = snapshot
        .timers
        .iter()
        .filter_map(|t| t.fire_at().filter(|at| *at > now).map(|at| (t, at)))
        .collect();
    timers.sort_by_key(|(_, at)| *at);
    for ((timer, at), cell) in timers.iter().zip(timer_cells(timers.len())) {
        cells.entry(cell).or_default().push(timer_card(timer, *at, now));
    }

    if let Some(alarm) = &snapshot.active_alarm {
        cells
            .entry(ACTIVE_ALARM_CELL)
            .or_default()
            .push(active_alarm_card(alarm, options));
    }
    if let Some(timer) = &snapshot.active_timer {
        cells
            .entry(ACTIVE_TIMER_CELL)
            .or_default()
            .push(active_timer_card(timer, options));
    }
    if !snapshot.now_playing.is_empty() {
        cells
            .entry(NOW_PLAYING_CELL)
            .or_default()
            .push(now_playing_card(&snapshot.now_playing));
    }

    let mut out = String::with_capacity(16 * 1024);
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">");
    out.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>Overlay</title><style>",
    );
    out.push_str(&stylesheet(theme));
    out.push_str("</style></head>");
    let _ = write!(
        out,
        r#"<body data-version="{}" data-reason="{}" data-generated-ms="{}"><main class="overlay-grid">"#,
        snapshot.version,
        escape_html(&snapshot.last_reason),
        now.timestamp_millis()
    );
    for cell in CELLS {
        let _ = write!(out, r#"<section class="cell" data-cell="{cell}">"#);
        if let Some(cards) = cells.get(cell) {
            for card in cards {
                out.push_str(card);
            }
        }
        out.push_str("</section>");
    }
    out.push_str("</main>");

    if let Some(card) = &snapshot.info_card {
        out.push_str(&info_card_view(card, now, options));
    }

    if theme.show_notification_bar {
        let badges = notification_badges(snapshot, now);
        if !badges.is_empty() {
            out.push_str(r#"<footer class="notification-bar">"#);
            for (category, text) in badges {
                let _ = write!(
                    out,
                    r#"<span class="badge badge-{category}" data-badge="{category}">{}</span>"#,
                    escape_html(&text)
                );
            }
            out.push_str("</footer>");
        }
    }

    out.push_str("<script>");
    out.push_str(TICK_SCRIPT);
    out.push_str("</script></body></html>");
    out
}
