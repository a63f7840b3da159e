use crate::overlay::clocks::{ClockConfig, DEFAULT_LOCAL_LABEL, DEFAULT_MAX_CLOCKS};
use crate::overlay::model::{
    schedule_entries, ActiveEvent, AlarmEntry, EventKind, InfoCard, Notification, OverlayChange,
    TimerEntry,
};
use crate::overlay::signature::signature;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const REASON_INIT: &str = "init";
pub const REASON_CLOCKS: &str = "clocks";
pub const REASON_NOW_PLAYING: &str = "now_playing";
pub const REASON_SCHEDULES: &str = "schedules";
pub const REASON_ACTIVE_ALARM: &str = "active_alarm";
pub const REASON_ACTIVE_TIMER: &str = "active_timer";
pub const REASON_NOTIFICATIONS: &str = "notifications";
pub const REASON_INFO_CARD: &str = "info_card";

/// Immutable copy of the overlay state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySnapshot {
    pub version: u64,
    pub clocks: Vec<ClockConfig>,
    pub now_playing: String,
    pub timers: Vec<TimerEntry>,
    pub alarms: Vec<AlarmEntry>,
    pub active_alarm: Option<ActiveEvent>,
    pub active_timer: Option<ActiveEvent>,
    pub notifications: Vec<Notification>,
    pub info_card: Option<InfoCard>,
    pub last_reason: String,
    pub generated_at: DateTime<Utc>,
    pub schedule_snapshot: Option<Value>,
}

pub type ChangeListener = Arc<dyn Fn(&OverlayChange) + Send + Sync>;

struct OverlayState {
    version: u64,
    clocks: Vec<ClockConfig>,
    now_playing: String,
    timers: Vec<TimerEntry>,
    alarms: Vec<AlarmEntry>,
    active_alarm: Option<ActiveEvent>,
    active_timer: Option<ActiveEvent>,
    notifications: Vec<Notification>,
    info_card: Option<InfoCard>,
    last_reason: String,
    schedule_snapshot: Option<Value>,
    timers_sig: String,
    alarms_sig: String,
    schedule_sig: String,
    active_alarm_sig: String,
    active_timer_sig: String,
    notifications_sig: String,
    info_card_sig: String,
}

impl OverlayState {
    fn new(clocks: Vec<ClockConfig>) -> Self {
        let empty: Vec<Value> = Vec::new();
        let none: Option<Value> = None;
        Self {
            version: 0,
            clocks,
            now_playing: String::new(),
            timers: Vec::new(),
            alarms: Vec::new(),
            active_alarm: None,
            active_timer: None,
            notifications: Vec::new(),
            info_card: None,
            last_reason: REASON_INIT.to_string(),
            schedule_snapshot: None,
            timers_sig: signature(&empty),
            alarms_sig: signature(&empty),
            schedule_sig: signature(&none),
            active_alarm_sig: signature(&none),
            active_timer_sig: signature(&none),
            notifications_sig: signature(&empty),
            info_card_sig: signature(&none),
        }
    }
}

/// Thread-safe, versioned source of truth for everything the overlay shows.
///
/// Every update is compared against the stored content by canonical
/// signature; only real changes bump `version`. A single mutex serialises
/// all access and is never held across I/O or listener calls.
pub struct OverlayStateManager {
    state: Mutex<OverlayState>,
    listener: Mutex<Option<ChangeListener>>,
    max_clocks: usize,
}

impl OverlayStateManager {
    pub fn new(clocks: Vec<ClockConfig>) -> Self {
        Self::with_max_clocks(clocks, DEFAULT_MAX_CLOCKS)
    }

    pub fn with_max_clocks(clocks: Vec<ClockConfig>, max_clocks: usize) -> Self {
        let max_clocks = max_clocks.max(1);
        let mut clocks: Vec<ClockConfig> = clocks.into_iter().take(max_clocks).collect();
        if clocks.is_empty() {
            clocks.push(ClockConfig::local("clock0", DEFAULT_LOCAL_LABEL));
        }
        Self {
            state: Mutex::new(OverlayState::new(clocks)),
            listener: Mutex::new(None),
            max_clocks,
        }
    }

    /// Register the `on_state_change` collaborator. It runs on the mutating
    /// thread after the state lock is released.
    ///
    /// Every change is delivered exactly once, but concurrent producers may
    /// deliver them out of version order. Listeners that care should keep
    /// the highest `version` seen and ignore older ones.
    pub fn set_change_listener<F>(&self, listener: F)
    where
        F: Fn(&OverlayChange) + Send + Sync + 'static,
    {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    pub fn clear_change_listener(&self) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn max_clocks(&self) -> usize {
        self.max_clocks
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn configure_clocks(&self, clocks: Vec<ClockConfig>) -> OverlayChange {
        let clocks: Vec<ClockConfig> = clocks.into_iter().take(self.max_clocks).collect();
        self.apply(REASON_CLOCKS, |state| {
            if clocks.is_empty() || state.clocks == clocks {
                return false;
            }
            state.clocks = clocks;
            true
        })
    }

    pub fn update_now_playing(&self, text: &str) -> OverlayChange {
        let text = text.trim();
        self.apply(REASON_NOW_PLAYING, |state| {
            if state.now_playing == text {
                return false;
            }
            state.now_playing = text.to_string();
            true
        })
    }

    /// Replace timers and alarms from a scheduler snapshot of the form
    /// `{"timers": [...], "alarms": [...], ...}`. Entries are stored verbatim,
    /// including ones whose fire time is past or unreadable.
    pub fn update_schedule_snapshot(&self, snapshot: &Value) -> OverlayChange {
        let timers = schedule_entries(snapshot.get("timers"));
        let alarms = schedule_entries(snapshot.get("alarms"));
        let raw = snapshot.is_object().then(|| snapshot.clone());

        let timers_sig = signature(&timers);
        let alarms_sig = signature(&alarms);
        let schedule_sig = signature(&raw);

        self.apply(REASON_SCHEDULES, |state| {
            if state.timers_sig == timers_sig
                && state.alarms_sig == alarms_sig
                && state.schedule_sig == schedule_sig
            {
                return false;
            }
            state.timers = timers;
            state.alarms = alarms;
            state.schedule_snapshot = raw;
            state.timers_sig = timers_sig;
            state.alarms_sig = alarms_sig;
            state.schedule_sig = schedule_sig;
            true
        })
    }

    pub fn update_active_event(&self, kind: EventKind, payload: &Value) -> OverlayChange {
        let event = ActiveEvent::from_payload(payload);
        let sig = signature(&event);
        let reason = match kind {
            EventKind::Alarm => REASON_ACTIVE_ALARM,
            EventKind::Timer => REASON_ACTIVE_TIMER,
        };
        self.apply(reason, |state| {
            let (slot, slot_sig) = match kind {
                EventKind::Alarm => (&mut state.active_alarm, &mut state.active_alarm_sig),
                EventKind::Timer => (&mut state.active_timer, &mut state.active_timer_sig),
            };
            if *slot_sig == sig {
                return false;
            }
            *slot = event;
            *slot_sig = sig;
            true
        })
    }

    /// Replace the notification list. Non-object entries are dropped.
    pub fn update_notifications(&self, notifications: &[Value]) -> OverlayChange {
        let notifications: Vec<Notification> = notifications
            .iter()
            .filter_map(|n| n.as_object().cloned())
            .collect();
        let sig = signature(&notifications);
        self.apply(REASON_NOTIFICATIONS, |state| {
            if state.notifications_sig == sig {
                return false;
            }
            state.notifications = notifications;
            state.notifications_sig = sig;
            true
        })
    }

    /// Show or clear (`None`) the info card. Last write wins.
    pub fn update_info_card(&self, card: Option<InfoCard>) -> OverlayChange {
        let sig = signature(&card);
        self.apply(REASON_INFO_CARD, |state| {
            if state.info_card_sig == sig {
                return false;
            }
            state.info_card = card;
            state.info_card_sig = sig;
            true
        })
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        let state = self.lock();
        OverlaySnapshot {
            version: state.version,
            clocks: state.clocks.clone(),
            now_playing: state.now_playing.clone(),
            timers: state.timers.clone(),
            alarms: state.alarms.clone(),
            active_alarm: state.active_alarm.clone(),
            active_timer: state.active_timer.clone(),
            notifications: state.notifications.clone(),
            info_card: state.info_card.clone(),
            last_reason: state.last_reason.clone(),
            generated_at: Utc::now(),
            schedule_snapshot: state.schedule_snapshot.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply<F>(&self, reason: &str, mutate: F) -> OverlayChange
    where
        F: FnOnce(&mut OverlayState) -> bool,
    {
        let change = {
            let mut state = self.lock();
            let changed = mutate(&mut state);
            if changed {
                state.version += 1;
                state.last_reason = reason.to_string();
            }
            OverlayChange {
                changed,
                version: state.version,
                reason: reason.to_string(),
            }
        };

        if change.changed {
            tracing::debug!(version = change.version, reason, "overlay state changed");
            let listener = self
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(listener) = listener {
                listener(&change);
            }
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> OverlayStateManager {
        OverlayStateManager::new(vec![ClockConfig::local("clock0", "Local")])
    }

    #[test]
    fn starts_at_version_zero_with_init_reason() {
        let snap = manager().snapshot();
        assert_eq!(snap.version, 0);
        assert_eq!(snap.last_reason, REASON_INIT);
        assert_eq!(snap.clocks.len(), 1);
    }

    #[test]
    fn empty_seed_gets_a_local_clock() {
        let mgr = OverlayStateManager::new(Vec::new());
        let snap = mgr.snapshot();
        assert_eq!(snap.clocks, vec![ClockConfig::local("clock0", DEFAULT_LOCAL_LABEL)]);
    }

    #[test]
    fn now_playing_is_trimmed_before_comparison() {
        let mgr = manager();
        assert!(mgr.update_now_playing("  Song  ").changed);
        let again = mgr.update_now_playing("Song");
        assert!(!again.changed);
        assert_eq!(again.version, 1);
        assert_eq!(mgr.snapshot().now_playing, "Song");
    }

    #[test]
    fn schedule_key_order_is_not_a_change() {
        let mgr = manager();
        let a: Value =
            serde_json::from_str(r#"{"timers":[{"label":"Tea","next_fire":100}],"alarms":[]}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"alarms":[],"timers":[{"next_fire":100,"label":"Tea"}]}"#)
                .unwrap();
        assert!(mgr.update_schedule_snapshot(&a).changed);
        let second = mgr.update_schedule_snapshot(&b);
        assert!(!second.changed);
        assert_eq!(second.version, 1);
    }

    #[test]
    fn schedule_extra_fields_alone_bump_once() {
        let mgr = manager();
        mgr.update_schedule_snapshot(&json!({"timers": [], "alarms": []}));
        let change = mgr.update_schedule_snapshot(&json!({
            "timers": [], "alarms": [], "reminders": [{"label": "Call"}]
        }));
        assert!(change.changed);
        assert_eq!(change.version, 2);
        assert_eq!(change.reason, REASON_SCHEDULES);
    }

    #[test]
    fn schedule_drops_non_object_entries() {
        let mgr = manager();
        mgr.update_schedule_snapshot(&json!({"timers": [1, {"label": "Eggs"}, "x"]}));
        let snap = mgr.snapshot();
        assert_eq!(snap.timers.len(), 1);
        assert_eq!(snap.timers[0].label(), Some("Eggs"));
        assert!(snap.alarms.is_empty());
    }

    #[test]
    fn active_timer_and_alarm_slots_are_independent() {
        let mgr = manager();
        mgr.update_active_event(EventKind::Timer, &json!({"state": "active"}));
        let snap = mgr.snapshot();
        assert!(snap.active_timer.is_some());
        assert!(snap.active_alarm.is_none());
        assert_eq!(snap.last_reason, REASON_ACTIVE_TIMER);
    }

    #[test]
    fn clearing_an_empty_slot_is_not_a_change() {
        let mgr = manager();
        let change = mgr.update_active_event(EventKind::Alarm, &json!({"state": "idle"}));
        assert!(!change.changed);
        assert_eq!(change.version, 0);
    }

    #[test]
    fn info_card_last_write_wins() {
        let mgr = manager();
        let card = InfoCard::listing("alarms", "Alarms", vec![]);
        assert!(mgr.update_info_card(Some(card.clone())).changed);
        assert!(!mgr.update_info_card(Some(card)).changed);
        assert!(mgr.update_info_card(None).changed);
        assert!(!mgr.update_info_card(None).changed);
        assert_eq!(mgr.version(), 2);
    }

    #[test]
    fn configure_clocks_respects_custom_maximum() {
        let mgr = OverlayStateManager::with_max_clocks(Vec::new(), 2);
        let clocks = vec![
            ClockConfig::local("a", "A"),
            ClockConfig::local("b", "B"),
            ClockConfig::local("c", "C"),
        ];
        mgr.configure_clocks(clocks);
        let keys: Vec<_> = mgr.snapshot().clocks.into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn listener_sees_only_real_changes() {
        let mgr = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        mgr.set_change_listener(move |change| {
            assert!(change.changed);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        mgr.update_now_playing("a");
        mgr.update_now_playing("a");
        mgr.update_notifications(&[json!({"title": "Mail"})]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        mgr.clear_change_listener();
        mgr.update_now_playing("b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_gets_every_version_once_under_concurrency() {
        let mgr = Arc::new(manager());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mgr.set_change_listener(move |change| sink.lock().unwrap().push(change.version));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let mgr = Arc::clone(&mgr);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        mgr.update_now_playing(&format!("w{w}-{i}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut versions = seen.lock().unwrap().clone();
        versions.sort_unstable();
        let expected: Vec<u64> = (1..=mgr.version()).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn listener_may_read_state() {
        let mgr = Arc::new(manager());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (inner, sink) = (Arc::downgrade(&mgr), observed.clone());
        mgr.set_change_listener(move |_| {
            if let Some(mgr) = inner.upgrade() {
                sink.lock().unwrap().push(mgr.snapshot().now_playing);
            }
        });
        mgr.update_now_playing("Radio");
        assert_eq!(*observed.lock().unwrap(), vec!["Radio".to_string()]);
    }
}
