use crate::overlay::clocks::{parse_clock_spec, ClockConfig, DEFAULT_LOCAL_LABEL, DEFAULT_MAX_CLOCKS};
use crate::overlay::render::OverlayTheme;
use crate::overlay::server::OverlayServerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OverlaySettings {
    /// When enabled the application initialises the logger at debug level.
    /// Defaults to `false` when the field is missing in the settings file.
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional file that receives a copy of the log output.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Clock spec, e.g. `local,Europe/London=London,Asia/Tokyo`.
    #[serde(default = "default_clocks")]
    pub clocks: String,
    #[serde(default = "default_max_clocks")]
    pub max_clocks: usize,
    /// Label used for the host-local clock when the spec does not name one.
    #[serde(default = "default_local_clock_label")]
    pub local_clock_label: String,
    #[serde(default)]
    pub server: OverlayServerConfig,
    #[serde(default)]
    pub theme: OverlayTheme,
}

fn default_clocks() -> String {
    "local".into()
}

fn default_max_clocks() -> usize {
    DEFAULT_MAX_CLOCKS
}

fn default_local_clock_label() -> String {
    DEFAULT_LOCAL_LABEL.into()
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_file: None,
            clocks: default_clocks(),
            max_clocks: default_max_clocks(),
            local_clock_label: default_local_clock_label(),
            server: OverlayServerConfig::default(),
            theme: OverlayTheme::default(),
        }
    }
}

impl OverlaySettings {
    /// Load settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn clock_configs(&self) -> Vec<ClockConfig> {
        parse_clock_spec(&self.clocks, self.max_clocks, &self.local_clock_label)
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}
