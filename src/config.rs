use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::clock::engine::{ClockSettings, DEFAULT_TICK_INTERVAL, DEFAULT_WARNING_THRESHOLD};
use crate::clock::side::TimeControl;

#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub settings: ClockSettings,
    pub default_preset: Option<String>,
    pub presets: Vec<Preset>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            settings: ClockSettings::default(),
            default_preset: None,
            presets: builtin_presets(),
        }
    }
}

impl ClockConfig {
    pub fn find_preset(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    /// Time control used when nothing else is selected on the command line.
    pub fn default_time_control(&self) -> TimeControl {
        self.default_preset
            .as_deref()
            .and_then(|id| self.find_preset(id))
            .map(|preset| preset.time_control)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetCategory {
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Custom,
}

impl PresetCategory {
    pub fn label(self) -> &'static str {
        match self {
            PresetCategory::Bullet => "bullet",
            PresetCategory::Blitz => "blitz",
            PresetCategory::Rapid => "rapid",
            PresetCategory::Classical => "classical",
            PresetCategory::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Preset {
    pub id: String,
    pub category: PresetCategory,
    pub time_control: TimeControl,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<16} {:<10} {}",
            self.id,
            self.category.label(),
            self.time_control
        )
    }
}

// Quick-setup options: starting minutes + increment seconds.
const BUILTIN_PRESETS: [(PresetCategory, u64, u64); 11] = [
    (PresetCategory::Bullet, 1, 0),
    (PresetCategory::Bullet, 2, 1),
    (PresetCategory::Blitz, 3, 0),
    (PresetCategory::Blitz, 3, 2),
    (PresetCategory::Blitz, 5, 0),
    (PresetCategory::Blitz, 5, 3),
    (PresetCategory::Rapid, 10, 0),
    (PresetCategory::Rapid, 10, 5),
    (PresetCategory::Rapid, 15, 10),
    (PresetCategory::Classical, 30, 0),
    (PresetCategory::Classical, 30, 20),
];

pub fn builtin_presets() -> Vec<Preset> {
    BUILTIN_PRESETS
        .iter()
        .map(|&(category, minutes, increment_secs)| Preset {
            id: format!("{}-{minutes}+{increment_secs}", category.label()),
            category,
            time_control: TimeControl {
                starting_time: Duration::from_secs(minutes * 60),
                increment: Duration::from_secs(increment_secs),
            },
        })
        .collect()
}

pub fn load_clock_config(path: &Path) -> Result<ClockConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read clock config {}", path.display()))?;
    parse_clock_config_text(&content)
}

pub fn parse_clock_config_text(content: &str) -> Result<ClockConfig> {
    let raw = serde_json::from_str::<ClockConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported clock config version {}; expected version 1",
            raw.version
        );
    }
    if raw.settings.tick_interval_ms == 0 {
        bail!("tick_interval_ms must be greater than zero");
    }

    let mut presets = builtin_presets();
    let mut ids = presets
        .iter()
        .map(|preset| preset.id.clone())
        .collect::<HashSet<_>>();
    for preset in raw.presets {
        if !ids.insert(preset.id.clone()) {
            bail!("duplicate preset id found: {}", preset.id);
        }
        let time_control = TimeControl::parse(&preset.starting_time, &preset.increment)
            .with_context(|| format!("preset '{}' has an invalid time control", preset.id))?;
        presets.push(Preset {
            id: preset.id,
            category: preset.category,
            time_control,
        });
    }

    if let Some(default_id) = raw.settings.default_preset.as_deref()
        && !ids.contains(default_id)
    {
        bail!("default_preset '{default_id}' does not name a known preset");
    }

    Ok(ClockConfig {
        settings: ClockSettings {
            tick_interval: Duration::from_millis(raw.settings.tick_interval_ms),
            warning_threshold: Duration::from_millis(raw.settings.warning_threshold_ms),
        },
        default_preset: raw.settings.default_preset,
        presets,
    })
}

#[derive(Debug, Deserialize)]
struct ClockConfigFile {
    version: u32,
    #[serde(default)]
    settings: ClockSettingsFile,
    #[serde(default)]
    presets: Vec<PresetFile>,
}

#[derive(Debug, Deserialize)]
struct ClockSettingsFile {
    #[serde(default = "default_tick_interval_ms")]
    tick_interval_ms: u64,
    #[serde(default = "default_warning_threshold_ms")]
    warning_threshold_ms: u64,
    #[serde(default)]
    default_preset: Option<String>,
}

impl Default for ClockSettingsFile {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            warning_threshold_ms: default_warning_threshold_ms(),
            default_preset: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    id: String,
    #[serde(default = "default_category")]
    category: PresetCategory,
    starting_time: String,
    #[serde(default = "default_increment")]
    increment: String,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_warning_threshold_ms() -> u64 {
    DEFAULT_WARNING_THRESHOLD.as_millis() as u64
}

fn default_category() -> PresetCategory {
    PresetCategory::Custom
}

fn default_increment() -> String {
    "00:00".to_string()
}
