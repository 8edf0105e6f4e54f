//! Default paths for vmherd components
//!
//! Provides centralized path defaults that all crates can use:
//! - Config: `$VMHERD_CONFIG`, else `$XDG_CONFIG_HOME/vmherd/config.toml`,
//!   else `~/.config/vmherd/config.toml`
//! - VBoxManage executable, resolved once at startup from the host platform

use std::path::{Path, PathBuf};

/// Environment variable for overriding the config file path
pub const VMHERD_CONFIG_ENV: &str = "VMHERD_CONFIG";

/// Environment variable for overriding the VBoxManage executable on any platform
pub const VMHERD_VBOXMANAGE_ENV: &str = "VMHERD_VBOXMANAGE";

/// Windows installer variables pointing at the VirtualBox install directory
const VBOX_INSTALL_PATH_ENVS: [&str; 2] = ["VBOX_INSTALL_PATH", "VBOX_MSI_INSTALL_PATH"];

const APP_DIR: &str = "vmherd";
const CONFIG_FILENAME: &str = "config.toml";

/// Host platform family, detected once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Unix,
}

impl HostPlatform {
    pub fn detect() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Unix
        }
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(VMHERD_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Resolve the VBoxManage executable from the real process environment.
pub fn resolve_vboxmanage(configured: Option<&Path>, platform: HostPlatform) -> PathBuf {
    resolve_vboxmanage_with(configured, platform, |key| std::env::var(key).ok())
}

/// Resolve the VBoxManage executable.
///
/// Order of precedence:
/// 1. explicitly configured path
/// 2. `$VMHERD_VBOXMANAGE`
/// 3. on Windows, `%VBOX_INSTALL_PATH%` or `%VBOX_MSI_INSTALL_PATH%` joined with `VBoxManage.exe`
/// 4. `vboxmanage` from `PATH`
pub fn resolve_vboxmanage_with(
    configured: Option<&Path>,
    platform: HostPlatform,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    if let Some(path) = env(VMHERD_VBOXMANAGE_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    if platform == HostPlatform::Windows
        && let Some(dir) = VBOX_INSTALL_PATH_ENVS
            .iter()
            .find_map(|key| env(key).filter(|p| !p.is_empty()))
    {
        return PathBuf::from(dir).join("VBoxManage.exe");
    }

    PathBuf::from("vboxmanage")
}
