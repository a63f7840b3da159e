use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CLOCKS: usize = 4;
pub const DEFAULT_LOCAL_LABEL: &str = "Local";

/// One clock face on the overlay. `timezone == None` renders in the host's
/// local zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl ClockConfig {
    pub fn local(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            timezone: None,
        }
    }

    /// Resolve the configured zone. `None` means local time, as does an
    /// identifier that no longer parses.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|name| name.parse().ok())
    }

    pub fn is_local(&self) -> bool {
        self.timezone.is_none()
    }
}

fn is_local_token(zone: &str) -> bool {
    zone.eq_ignore_ascii_case("local") || zone.eq_ignore_ascii_case("system")
}

/// "America/New_York" -> "New York"
fn label_for_zone(zone: &str) -> String {
    zone.rsplit('/')
        .next()
        .unwrap_or(zone)
        .replace('_', " ")
}

/// Parse a clock spec such as `local,Europe/London=London,Asia/Tokyo`.
///
/// Tokens are `zone` or `zone=Label`. `local`/`system` (any case) selects the
/// host zone. Unknown zone identifiers are logged and skipped. At most
/// `max_clocks` entries are produced; when no local clock was requested and
/// there is room, one is placed first. The result is never empty.
pub fn parse_clock_spec(spec: &str, max_clocks: usize, default_label: &str) -> Vec<ClockConfig> {
    let max_clocks = max_clocks.max(1);
    let mut entries: Vec<(String, Option<String>)> = Vec::new();
    let mut saw_local = false;

    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if entries.len() >= max_clocks {
            break;
        }
        let (zone, label) = match token.split_once('=') {
            Some((zone, label)) => (zone.trim(), Some(label.trim()).filter(|l| !l.is_empty())),
            None => (token, None),
        };

        if is_local_token(zone) {
            saw_local = true;
            let label = label.unwrap_or(default_label).to_string();
            entries.push((label, None));
            continue;
        }

        match zone.parse::<Tz>() {
            Ok(tz) => {
                let name = tz.name().to_string();
                let label = label
                    .map(str::to_string)
                    .unwrap_or_else(|| label_for_zone(&name));
                entries.push((label, Some(name)));
            }
            Err(_) => {
                tracing::warn!(token, "ignoring clock with unknown timezone");
            }
        }
    }

    if !saw_local && entries.len() < max_clocks {
        entries.insert(0, (default_label.to_string(), None));
    }
    if entries.is_empty() {
        entries.push((default_label.to_string(), None));
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(idx, (label, timezone))| ClockConfig {
            key: format!("clock{idx}"),
            label,
            timezone,
        })
        .collect()
}
