//! Validated settings structures

use crate::schema::{RawConfig, RawHypervisorConfig, RawRotationConfig};
use crate::validation::{parse_escape_mode, parse_start_mode};
use std::path::PathBuf;
use std::time::Duration;
use vmherd_api::{StartMode, TOP_LEVEL_GROUP};

/// Argument escaping preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeModeSetting {
    /// Pick from the host platform at startup
    #[default]
    Auto,
    Posix,
    Windows,
}

/// Validated settings, built once at process start
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub hypervisor: HypervisorSettings,
    pub rotation: RotationSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            hypervisor: HypervisorSettings::from_raw(raw.hypervisor),
            rotation: RotationSettings::from_raw(raw.rotation),
        }
    }
}

/// How to run the hypervisor tool
#[derive(Debug, Clone, Default)]
pub struct HypervisorSettings {
    /// Explicit executable; `None` means resolve from the platform
    pub executable: Option<PathBuf>,
    pub escape_mode: EscapeModeSetting,
    /// Log every command line at info level
    pub debug: bool,
}

impl HypervisorSettings {
    fn from_raw(raw: RawHypervisorConfig) -> Self {
        Self {
            executable: raw.executable,
            escape_mode: raw
                .escape_mode
                .as_deref()
                .and_then(|m| parse_escape_mode(m).ok())
                .unwrap_or_default(),
            debug: raw.debug,
        }
    }
}

/// Rotation policy parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSettings {
    pub enabled: bool,
    /// Maximum machines powered on at once
    pub running_limit: usize,
    /// Time a started machine stays on before it is powered off
    pub work_duration: Duration,
    /// Offset between consecutive start jobs of one cycle
    pub start_stagger: Duration,
    /// Delay between a power-off and the next rescan
    pub restart_cooldown: Duration,
    /// Group path of the machines under rotation
    pub group: String,
    pub start_mode: StartMode,
}

impl RotationSettings {
    fn from_raw(raw: RawRotationConfig) -> Self {
        let defaults = Self::default();

        Self {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            running_limit: raw.running_limit.unwrap_or(defaults.running_limit),
            work_duration: raw
                .work_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.work_duration),
            start_stagger: raw
                .start_stagger_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.start_stagger),
            restart_cooldown: raw
                .restart_cooldown_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.restart_cooldown),
            group: raw.group.unwrap_or(defaults.group),
            start_mode: raw
                .start_mode
                .as_deref()
                .and_then(|m| parse_start_mode(m).ok())
                .unwrap_or(defaults.start_mode),
        }
    }
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            running_limit: 2,
            work_duration: Duration::from_secs(2 * 60),
            start_stagger: Duration::from_secs(30),
            restart_cooldown: Duration::from_secs(5),
            group: TOP_LEVEL_GROUP.to_string(),
            start_mode: StartMode::Headless,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rotation_policy() {
        let rotation = RotationSettings::default();
        assert_eq!(rotation.running_limit, 2);
        assert_eq!(rotation.work_duration, Duration::from_secs(120));
        assert_eq!(rotation.start_stagger, Duration::from_secs(30));
        assert_eq!(rotation.restart_cooldown, Duration::from_secs(5));
        assert_eq!(rotation.group, "/");
    }

    #[test]
    fn raw_values_override_defaults() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [hypervisor]
            escape_mode = "windows"
            [rotation]
            work_seconds = 900
            start_mode = "gui"
        "#,
        )
        .unwrap();

        let settings = Settings::from_raw(raw);
        assert_eq!(settings.hypervisor.escape_mode, EscapeModeSetting::Windows);
        assert_eq!(settings.rotation.work_duration, Duration::from_secs(900));
        assert_eq!(settings.rotation.start_mode, StartMode::Gui);
        assert_eq!(settings.rotation.running_limit, 2);
    }
}
