//! Records exchanged with producers and handed to the renderer.
//!
//! Producers deliver open JSON objects. They are checked at the boundary
//! (anything that is not an object is dropped) and kept verbatim, with typed
//! accessors for the handful of fields the overlay actually interprets.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const LABEL_KEYS: [&str; 2] = ["label", "name"];
const FIRE_TIME_KEYS: [&str; 2] = ["next_fire", "target"];

/// A scheduled timer or alarm as supplied by a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleEntry {
    fields: Map<String, Value>,
}

pub type TimerEntry = ScheduleEntry;
pub type AlarmEntry = ScheduleEntry;

impl ScheduleEntry {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Accepts only JSON objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned().map(Self::new)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn id(&self) -> Option<String> {
        value_as_id(self.fields.get("id")?)
    }

    pub fn label(&self) -> Option<&str> {
        first_label(&self.fields)
    }

    /// Fire time from `next_fire` or `target`; `None` if absent or unparsable.
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        FIRE_TIME_KEYS
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(parse_fire_time)
    }

    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.fire_at().is_some_and(|at| at > now)
    }

    /// True for `"paused": true` or `"status": "paused"`.
    pub fn is_paused(&self) -> bool {
        self.fields.get("paused").and_then(Value::as_bool).unwrap_or(false)
            || self
                .fields
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("paused"))
    }
}

/// Keep only the object entries of a JSON list.
pub fn schedule_entries(value: Option<&Value>) -> Vec<ScheduleEntry> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(ScheduleEntry::from_value).collect())
        .unwrap_or_default()
}

pub type Notification = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveState {
    Ringing,
    Active,
}

impl ActiveState {
    pub fn as_str(self) -> &'static str {
        match self {
            ActiveState::Ringing => "ringing",
            ActiveState::Active => "active",
        }
    }
}

/// An alarm or timer that is currently going off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub state: ActiveState,
    pub event: Option<Map<String, Value>>,
}

impl ActiveEvent {
    /// Normalise a producer payload. Only `state` values of `ringing` and
    /// `active` produce an event; everything else clears the slot.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let state = match payload.get("state").and_then(Value::as_str)? {
            "ringing" => ActiveState::Ringing,
            "active" => ActiveState::Active,
            _ => return None,
        };
        let event = payload.get("event").and_then(Value::as_object).cloned();
        Some(Self { state, event })
    }

    pub fn event_id(&self) -> Option<String> {
        value_as_id(self.event.as_ref()?.get("id")?)
    }

    pub fn label(&self) -> Option<&str> {
        first_label(self.event.as_ref()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Alarm,
    Timer,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Alarm => "alarm",
            EventKind::Timer => "timer",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type '{}'", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("alarm") {
            Ok(EventKind::Alarm)
        } else if s.eq_ignore_ascii_case("timer") {
            Ok(EventKind::Timer)
        } else {
            Err(UnknownEventKind(s.to_string()))
        }
    }
}

/// Result of every state mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayChange {
    pub changed: bool,
    pub version: u64,
    pub reason: String,
}

/// The single modal-style card shown above the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfoCard {
    fields: Map<String, Value>,
}

impl InfoCard {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned().map(Self::new)
    }

    /// Build a listing card such as the one shown for `show_alarms`.
    pub fn listing(kind: &str, title: &str, items: Vec<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".into(), Value::String(kind.into()));
        fields.insert("title".into(), Value::String(title.into()));
        fields.insert("items".into(), Value::Array(items));
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn kind(&self) -> &str {
        self.fields.get("type").and_then(Value::as_str).unwrap_or("info")
    }

    pub fn title(&self) -> Option<&str> {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn body(&self) -> Option<&str> {
        self.fields
            .get("body")
            .or_else(|| self.fields.get("text"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn items(&self) -> Vec<ScheduleEntry> {
        schedule_entries(self.fields.get("items"))
    }
}

fn first_label(fields: &Map<String, Value>) -> Option<&str> {
    LABEL_KEYS
        .iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|label| !label.is_empty())
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a fire time given as epoch seconds (number or numeric string) or as
/// ISO-8601. Timestamps without an offset are taken as UTC.
pub fn parse_fire_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_epoch_seconds(n.as_f64()?),
        Value::String(s) => parse_fire_time_str(s),
        _ => None,
    }
}

fn parse_fire_time_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return from_epoch_seconds(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
