//! Backend construction and the rotation service

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vmherd_config::{EscapeModeSetting, HypervisorSettings, RotationSettings};
use vmherd_core::{Rotator, RotatorHandle};
use vmherd_host_api::Hypervisor;
use vmherd_util::{HostPlatform, resolve_vboxmanage};
use vmherd_vbox::{EscapeMode, RunnerConfig, VBoxHost, VBoxManage};

/// Escaping to use for `setting` on `platform`
pub fn escape_mode_for(setting: EscapeModeSetting, platform: HostPlatform) -> EscapeMode {
    match setting {
        EscapeModeSetting::Auto => EscapeMode::for_platform(platform),
        EscapeModeSetting::Posix => EscapeMode::Posix,
        EscapeModeSetting::Windows => EscapeMode::Windows,
    }
}

/// Runner configuration for this host
pub fn runner_config(settings: &HypervisorSettings, platform: HostPlatform) -> RunnerConfig {
    let executable = resolve_vboxmanage(settings.executable.as_deref(), platform);
    let mut config = RunnerConfig::new(executable, escape_mode_for(settings.escape_mode, platform));
    config.debug = settings.debug;
    config
}

/// Build the VirtualBox backend and detect the tool version.
///
/// A failed version check is logged; the backend then assumes a current tool.
pub async fn connect(settings: &HypervisorSettings) -> VBoxHost {
    let platform = HostPlatform::detect();
    let config = runner_config(settings, platform);

    info!(
        executable = %config.executable.display(),
        escape_mode = ?config.escape_mode,
        "Using VBoxManage"
    );

    let tool = VBoxManage::with_shell(config, platform);
    let tool = match tool.detect_version().await {
        Ok(version) => tool.with_version(version),
        Err(e) => {
            warn!(error = %e, "Could not detect VirtualBox version");
            tool
        }
    };

    VBoxHost::new(tool)
}

/// A running rotation scheduler
pub struct RotationService {
    handle: RotatorHandle,
    task: JoinHandle<()>,
}

impl RotationService {
    /// Spawn the scheduler, or `None` when rotation is disabled
    pub fn spawn(host: Arc<dyn Hypervisor>, settings: RotationSettings) -> Option<Self> {
        if !settings.enabled {
            info!("Rotation disabled by configuration");
            return None;
        }

        let (rotator, handle) = Rotator::new(host, settings);
        let task = tokio::spawn(rotator.run());
        Some(Self { handle, task })
    }

    pub fn handle(&self) -> &RotatorHandle {
        &self.handle
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown();
        self.task.await.context("Rotation scheduler task failed")
    }
}
