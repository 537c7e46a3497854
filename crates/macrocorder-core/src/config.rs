//! Process-wide configuration, loaded once at startup and never mutated

use crate::error::{Error, Result};
use crate::input::normalize_key_name;
use crate::screen::DisplayLayout;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Directory name used under the platform config dir
pub const APP_DIR: &str = "macrocorder";

/// Global hotkey bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hotkeys {
    pub record_toggle: String,
    pub play_toggle: String,
}

impl Default for Hotkeys {
    fn default() -> Self {
        Self {
            record_toggle: "f9".to_string(),
            play_toggle: "f10".to_string(),
        }
    }
}

/// Recorder tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Gap that ends a move block, in seconds
    pub pause_threshold_s: f64,
    /// Idle-flush watchdog period, in milliseconds
    pub poll_interval_ms: u64,
    /// Release must travel further than this (either axis) to count as a drag
    pub drag_threshold_px: f64,
    /// Raw event queue capacity between listener and capture thread
    pub channel_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            pause_threshold_s: 0.3,
            poll_interval_ms: 100,
            drag_threshold_px: 2.0,
            channel_capacity: 10_000,
        }
    }
}

impl RecorderConfig {
    /// Falls back to the default when the configured value is not a usable duration
    pub fn pause_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.pause_threshold_s.max(0.0)).unwrap_or_else(|e| {
            let fallback = Self::default().pause_threshold_s;
            warn!(value = self.pause_threshold_s, error = %e, fallback, "invalid pause threshold");
            Duration::from_secs_f64(fallback)
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Defaults for the player controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    pub speed: f64,
    /// 0 loops until stopped
    pub repeat: u32,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hotkeys: Hotkeys,
    pub recorder: RecorderConfig,
    pub playback: PlaybackDefaults,
    /// Fixed display layout; native monitor enumeration is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screens: Option<DisplayLayout>,
}

impl AppConfig {
    /// `<config dir>/macrocorder/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(Error::config(format!("{}: {}", path.display(), e))
                    .with_context(json!({ "path": path.display().to_string() })))
            }
        };
        serde_json::from_str(&text).map_err(|e| {
            Error::config(format!("{}: {}", path.display(), e)).with_context(json!({
                "path": path.display().to_string(),
                "line": e.line(),
                "column": e.column(),
            }))
        })
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        Self::load(&path).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable config");
            Self::default()
        })
    }

    /// Normalized hotkeys the recorder must never capture
    pub fn ignore_keys(&self) -> HashSet<String> {
        [&self.hotkeys.record_toggle, &self.hotkeys.play_toggle]
            .into_iter()
            .filter_map(|k| match normalize_key_name(k) {
                Ok(k) => Some(k),
                Err(e) => {
                    warn!(key = %k, error = %e, "invalid hotkey binding");
                    None
                }
            })
            .collect()
    }
}
