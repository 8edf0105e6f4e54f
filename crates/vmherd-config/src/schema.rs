//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// How to reach the hypervisor tool
    #[serde(default)]
    pub hypervisor: RawHypervisorConfig,

    /// Rotation policy
    #[serde(default)]
    pub rotation: RawRotationConfig,
}

/// Hypervisor tool settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHypervisorConfig {
    /// VBoxManage executable (default: resolved from platform and environment)
    pub executable: Option<PathBuf>,

    /// Argument escaping: "auto", "posix" or "windows"
    pub escape_mode: Option<String>,

    /// Log every command line before running it
    #[serde(default)]
    pub debug: bool,
}

/// Rotation policy settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRotationConfig {
    /// Run the rotation loop at all
    pub enabled: Option<bool>,

    /// Maximum machines powered on at once
    pub running_limit: Option<usize>,

    /// How long a started machine stays on, in seconds
    pub work_seconds: Option<u64>,

    /// Delay between consecutive starts of one cycle, in seconds
    pub start_stagger_seconds: Option<u64>,

    /// Delay between a power-off and the next rescan, in seconds
    pub restart_cooldown_seconds: Option<u64>,

    /// Only machines in this group take part (default "/")
    pub group: Option<String>,

    /// "headless" or "gui"
    pub start_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [hypervisor]
            executable = "/usr/lib/virtualbox/VBoxManage"
            escape_mode = "posix"
            debug = true

            [rotation]
            running_limit = 3
            work_seconds = 600
            start_stagger_seconds = 15
            restart_cooldown_seconds = 10
            group = "/farm"
            start_mode = "gui"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert!(config.hypervisor.debug);
        assert_eq!(config.rotation.running_limit, Some(3));
        assert_eq!(config.rotation.group.as_deref(), Some("/farm"));
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.hypervisor.executable.is_none());
        assert!(config.rotation.running_limit.is_none());
    }
}
