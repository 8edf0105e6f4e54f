//! Per-machine controller

use async_trait::async_trait;
use tracing::{debug, info};
use vmherd_api::{GuestOs, MachineInfo, SnapshotList, StartMode};
use vmherd_host_api::{HostError, HostResult, MachineControl};
use vmherd_util::{MachineName, SnapshotId};

use crate::guest::{exec_invocation, ExecOptions};
use crate::invocation::{quote_literal, CommandOptions, Invocation};
use crate::parse::{
    parse_info, parse_list, parse_property_value, parse_snapshots, parse_taken_snapshot,
    NO_SNAPSHOTS,
};
use crate::runner::VBoxManage;
use crate::scancodes::{break_code, format_scancodes, make_code};

/// Controller for one VirtualBox machine.
///
/// Holds the info from the last [`VBoxMachine::info`] call and the guest OS,
/// detected once per controller. Create a new controller to re-detect.
pub struct VBoxMachine {
    name: MachineName,
    /// Name as a quoted literal, ready for the command line
    literal: String,
    tool: VBoxManage,
    info: MachineInfo,
    os: Option<GuestOs>,
}

impl VBoxMachine {
    pub fn new(name: MachineName, tool: VBoxManage) -> Self {
        let literal = quote_literal(name.as_str());
        Self {
            name,
            literal,
            tool,
            info: MachineInfo::new(),
            os: None,
        }
    }

    pub fn name(&self) -> &MachineName {
        &self.name
    }

    fn controlvm(&self, action: &str) -> Invocation {
        Invocation::new("controlvm").arg(&self.literal).arg(action)
    }

    fn snapshot(&self, action: &str) -> Invocation {
        Invocation::new("snapshot").arg(&self.literal).arg(action)
    }

    fn guestproperty(&self, action: &str) -> Invocation {
        Invocation::new("guestproperty").arg(action).arg(&self.literal)
    }

    /// Query `showvminfo` and replace the cached info
    pub async fn info(&mut self) -> HostResult<MachineInfo> {
        let stdout = self
            .tool
            .run(
                &Invocation::new("showvminfo")
                    .arg(&self.literal)
                    .flag("machinereadable"),
            )
            .await?;

        self.info = parse_info(&stdout);
        Ok(self.info.clone())
    }

    /// Info as of the last [`VBoxMachine::info`] call
    pub fn cached_info(&self) -> &MachineInfo {
        &self.info
    }

    /// Flat value from the cached info
    pub fn get(&self, key: &str) -> Option<&str> {
        self.info.get(key)
    }

    pub async fn start(&self, mode: StartMode) -> HostResult<String> {
        info!(machine = %self.name, mode = mode.as_str(), "Starting machine");
        self.tool
            .run(
                &Invocation::new("startvm")
                    .arg(&self.literal)
                    .value("type", mode.as_str()),
            )
            .await
    }

    /// Save the machine state and stop it
    pub async fn stop(&self) -> HostResult<String> {
        info!(machine = %self.name, "Saving machine state");
        self.tool.run(&self.controlvm("savestate")).await
    }

    pub async fn savestate(&self) -> HostResult<String> {
        self.stop().await
    }

    pub async fn poweroff(&self) -> HostResult<String> {
        info!(machine = %self.name, "Powering off machine");
        self.tool.run(&self.controlvm("poweroff")).await
    }

    pub async fn pause(&self) -> HostResult<String> {
        self.tool.run(&self.controlvm("pause")).await
    }

    pub async fn resume(&self) -> HostResult<String> {
        self.tool.run(&self.controlvm("resume")).await
    }

    pub async fn reset(&self) -> HostResult<String> {
        self.tool.run(&self.controlvm("reset")).await
    }

    pub async fn acpi_power_button(&self) -> HostResult<String> {
        self.tool.run(&self.controlvm("acpipowerbutton")).await
    }

    pub async fn acpi_sleep_button(&self) -> HostResult<String> {
        self.tool.run(&self.controlvm("acpisleepbutton")).await
    }

    /// Whether the machine appears in `list runningvms`
    pub async fn is_running(&self) -> HostResult<bool> {
        let stdout = self
            .tool
            .run(&Invocation::new("list").arg("runningvms"))
            .await?;
        Ok(parse_list(&stdout).contains_name(&self.name))
    }

    /// All snapshots; a machine without snapshots yields an empty list
    pub async fn snapshot_list(&self) -> HostResult<SnapshotList> {
        match self
            .tool
            .run(&self.snapshot("list").flag("machinereadable"))
            .await
        {
            Ok(stdout) => Ok(parse_snapshots(&stdout)),
            Err(e) if e.mentions(NO_SNAPSHOTS) => {
                debug!(machine = %self.name, "Machine has no snapshots");
                Ok(SnapshotList::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Take a snapshot and return its UUID, if the tool reported one
    pub async fn snapshot_take(
        &self,
        name: &str,
        description: Option<&str>,
        live: bool,
        options: CommandOptions,
    ) -> HostResult<Option<SnapshotId>> {
        let mut options = options;
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            options = options.value("description", description);
        }
        if live {
            options = options.flag("live");
        }

        let stdout = self
            .tool
            .run(&self.snapshot("take").quoted(name).options(options))
            .await?;

        let uuid = parse_taken_snapshot(&stdout);
        info!(machine = %self.name, snapshot = name, uuid = ?uuid, "Snapshot taken");
        Ok(uuid)
    }

    pub async fn snapshot_delete(&self, uuid: &SnapshotId) -> HostResult<String> {
        self.tool
            .run(&self.snapshot("delete").arg(uuid.as_str()))
            .await
    }

    pub async fn snapshot_restore(&self, uuid: &SnapshotId) -> HostResult<String> {
        self.tool
            .run(&self.snapshot("restore").arg(uuid.as_str()))
            .await
    }

    /// Guest property value; `None` when the property is not set
    pub async fn get_property(&self, property: &str) -> HostResult<Option<String>> {
        let stdout = self
            .tool
            .run(&self.guestproperty("get").arg(property))
            .await?;
        Ok(parse_property_value(&stdout))
    }

    pub async fn set_property(
        &self,
        property: &str,
        value: &str,
        options: CommandOptions,
    ) -> HostResult<String> {
        self.tool
            .run(
                &self
                    .guestproperty("set")
                    .arg(property)
                    .quoted(value)
                    .options(options),
            )
            .await
    }

    pub async fn delete_property(&self, property: &str) -> HostResult<String> {
        self.tool
            .run(&self.guestproperty("delete").arg(property))
            .await
    }

    /// Guest OS family, detected from `ostype` on first use
    pub async fn os(&mut self) -> HostResult<GuestOs> {
        if let Some(os) = self.os {
            return Ok(os);
        }

        let info = self.info().await?;
        let os = info
            .guest_os()
            .ok_or_else(|| HostError::GuestOsUnknown(self.name.clone()))?;

        info!(machine = %self.name, os = %os, "Detected guest OS");
        self.os = Some(os);
        Ok(os)
    }

    /// Run a command inside the guest
    pub async fn exec(&mut self, options: &ExecOptions) -> HostResult<String> {
        if options.exec.is_empty() {
            return Err(HostError::InvalidArgument("exec command is empty".into()));
        }

        let os = self.os().await?;
        let invocation = exec_invocation(
            &self.literal,
            os,
            self.tool.version(),
            self.tool.config().escape_mode,
            options,
        );
        self.tool.run(&invocation).await
    }

    /// Kill a guest process by image name
    pub async fn kill(&mut self, process: &str, options: CommandOptions) -> HostResult<String> {
        if process.is_empty() {
            return Err(HostError::InvalidArgument("process name is empty".into()));
        }

        let os = self.os().await?;
        self.exec(&ExecOptions::kill(process, os, options)).await
    }

    /// Send raw scan codes to the guest keyboard
    pub async fn keyboard_put_scancode(&self, codes: &[u8]) -> HostResult<String> {
        self.tool
            .run(&self.controlvm("keyboardputscancode").arg(format_scancodes(codes)))
            .await
    }

    /// Press and release `key`
    pub async fn press_key(&self, key: &str) -> HostResult<String> {
        let mut codes = make_code(key)?.to_vec();
        codes.extend(break_code(key)?);
        self.keyboard_put_scancode(&codes).await
    }
}

#[async_trait]
impl MachineControl for VBoxMachine {
    fn name(&self) -> &MachineName {
        &self.name
    }

    async fn info(&mut self) -> HostResult<MachineInfo> {
        VBoxMachine::info(self).await
    }

    fn cached_info(&self) -> &MachineInfo {
        &self.info
    }

    async fn start(&self, mode: StartMode) -> HostResult<String> {
        VBoxMachine::start(self, mode).await
    }

    async fn stop(&self) -> HostResult<String> {
        VBoxMachine::stop(self).await
    }

    async fn poweroff(&self) -> HostResult<String> {
        VBoxMachine::poweroff(self).await
    }

    async fn is_running(&self) -> HostResult<bool> {
        VBoxMachine::is_running(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::EscapeMode;
    use crate::runner::{RawOutput, ToolVersion};
    use crate::testing::ScriptedExecutor;

    fn machine(executor: &ScriptedExecutor, name: &str) -> VBoxMachine {
        VBoxMachine::new(MachineName::new(name), executor.tool(EscapeMode::Posix))
    }

    #[tokio::test]
    async fn info_replaces_cache() {
        let executor = ScriptedExecutor::new();
        executor.respond(
            "showvminfo",
            RawOutput::success("VMState=\"running\"\ngroups=\"/\"\n"),
        );
        let mut vm = machine(&executor, "win 10");

        assert!(vm.get("VMState").is_none());
        let info = vm.info().await.unwrap();

        assert!(info.is_running());
        assert_eq!(vm.get("groups"), Some("/"));
        assert_eq!(
            executor.commands(),
            vec!["vboxmanage showvminfo \"win 10\" --machinereadable"]
        );
    }

    #[tokio::test]
    async fn lifecycle_commands() {
        let executor = ScriptedExecutor::new();
        let vm = machine(&executor, "a");

        vm.start(StartMode::Gui).await.unwrap();
        vm.stop().await.unwrap();
        vm.savestate().await.unwrap();
        vm.poweroff().await.unwrap();
        vm.pause().await.unwrap();
        vm.resume().await.unwrap();
        vm.reset().await.unwrap();
        vm.acpi_power_button().await.unwrap();
        vm.acpi_sleep_button().await.unwrap();

        assert_eq!(
            executor.commands(),
            vec![
                "vboxmanage startvm \"a\" --type gui",
                "vboxmanage controlvm \"a\" savestate",
                "vboxmanage controlvm \"a\" savestate",
                "vboxmanage controlvm \"a\" poweroff",
                "vboxmanage controlvm \"a\" pause",
                "vboxmanage controlvm \"a\" resume",
                "vboxmanage controlvm \"a\" reset",
                "vboxmanage controlvm \"a\" acpipowerbutton",
                "vboxmanage controlvm \"a\" acpisleepbutton",
            ]
        );
    }

    #[tokio::test]
    async fn is_running_checks_running_list() {
        let executor = ScriptedExecutor::new();
        executor.respond("list runningvms", RawOutput::success("\"b\" {2}\n\"a b\" {3}\n"));

        assert!(machine(&executor, "a b").is_running().await.unwrap());
        assert!(!machine(&executor, "a").is_running().await.unwrap());
    }

    #[tokio::test]
    async fn snapshot_list_without_snapshots_is_empty() {
        let executor = ScriptedExecutor::new();
        executor.respond(
            "snapshot",
            RawOutput {
                exit_code: Some(1),
                stdout: "This machine does not have any snapshots\n".into(),
                stderr: String::new(),
            },
        );

        let list = machine(&executor, "a").snapshot_list().await.unwrap();
        assert!(list.is_empty());
        assert!(list.current.is_none());
    }

    #[tokio::test]
    async fn snapshot_list_other_failures_propagate() {
        let executor = ScriptedExecutor::new();
        executor.respond("snapshot", RawOutput::failure(1, "Could not find a registered machine"));

        assert!(machine(&executor, "a").snapshot_list().await.is_err());
    }

    #[tokio::test]
    async fn snapshot_take_returns_uuid() {
        let executor = ScriptedExecutor::new();
        executor.respond(
            "snapshot",
            RawOutput::success("0%...100%\nSnapshot taken. UUID: 0a1b2c3d-0000-4000-8000-0123456789ab\n"),
        );
        let vm = machine(&executor, "a");

        let uuid = vm
            .snapshot_take("before update", Some("nightly \"golden\""), true, CommandOptions::new())
            .await
            .unwrap();

        assert_eq!(uuid, Some(SnapshotId::new("0a1b2c3d-0000-4000-8000-0123456789ab")));
        assert_eq!(
            executor.commands(),
            vec![
                "vboxmanage snapshot \"a\" take \"before update\" --description \"nightly \\\"golden\\\"\" --live"
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_delete_and_restore() {
        let executor = ScriptedExecutor::new();
        let vm = machine(&executor, "a");
        let id = SnapshotId::new("1111");

        vm.snapshot_delete(&id).await.unwrap();
        vm.snapshot_restore(&id).await.unwrap();

        assert_eq!(
            executor.commands(),
            vec![
                "vboxmanage snapshot \"a\" delete 1111",
                "vboxmanage snapshot \"a\" restore 1111",
            ]
        );
    }

    #[tokio::test]
    async fn guest_properties() {
        let executor = ScriptedExecutor::new();
        executor.respond("get \"a\" /VirtualBox/GuestInfo/Net/0/V4/IP", RawOutput::success("Value: 10.0.2.15\n"));
        executor.respond("get \"a\" /Missing", RawOutput::success("No value set!\n"));
        let vm = machine(&executor, "a");

        assert_eq!(
            vm.get_property("/VirtualBox/GuestInfo/Net/0/V4/IP").await.unwrap(),
            Some("10.0.2.15".into())
        );
        assert_eq!(vm.get_property("/Missing").await.unwrap(), None);

        vm.set_property("/app/mode", "kiosk mode", CommandOptions::new().value("flags", "TRANSIENT"))
            .await
            .unwrap();
        vm.delete_property("/app/mode").await.unwrap();

        let commands = executor.commands();
        assert_eq!(
            commands[2],
            "vboxmanage guestproperty set \"a\" /app/mode \"kiosk mode\" --flags TRANSIENT"
        );
        assert_eq!(commands[3], "vboxmanage guestproperty delete \"a\" /app/mode");
    }

    #[tokio::test]
    async fn os_is_detected_once() {
        let executor = ScriptedExecutor::new();
        executor.respond("showvminfo", RawOutput::success("ostype=\"Windows 10 (64-bit)\"\n"));
        let mut vm = machine(&executor, "a");

        assert_eq!(vm.os().await.unwrap(), GuestOs::Windows);
        assert_eq!(vm.os().await.unwrap(), GuestOs::Windows);
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn os_without_ostype_is_error() {
        let executor = ScriptedExecutor::new();
        executor.respond("showvminfo", RawOutput::success("VMState=\"running\"\n"));
        let mut vm = machine(&executor, "a");

        assert!(matches!(vm.os().await, Err(HostError::GuestOsUnknown(_))));
        // The operation is aborted before anything reaches the guest
        assert!(vm.exec(&ExecOptions::new("ls")).await.is_err());
        assert!(executor.commands().iter().all(|c| !c.contains("guestcontrol")));
    }

    #[tokio::test]
    async fn exec_and_kill_on_linux() {
        let executor = ScriptedExecutor::new();
        executor.respond("showvminfo", RawOutput::success("ostype=\"Ubuntu (64-bit)\"\n"));
        let mut vm = VBoxMachine::new(
            MachineName::new("a"),
            executor.tool(EscapeMode::Posix).with_version(ToolVersion::parse("6.1.0")),
        );

        vm.exec(&ExecOptions::new("touch").arg("/tmp/x")).await.unwrap();
        vm.kill("firefox", CommandOptions::new()).await.unwrap();

        let commands = executor.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[1].ends_with("-- /bin/sh -c \"touch /tmp/x\""));
        assert!(commands[2].contains("--no-wait-stdout --no-wait-stderr"));
        assert!(commands[2].ends_with("-- /bin/sh -c \"sudo killall firefox\""));
    }

    #[tokio::test]
    async fn kill_requires_process_name() {
        let executor = ScriptedExecutor::new();
        let mut vm = machine(&executor, "a");

        assert!(matches!(
            vm.kill("", CommandOptions::new()).await,
            Err(HostError::InvalidArgument(_))
        ));
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn press_key_sends_make_then_break() {
        let executor = ScriptedExecutor::new();
        let vm = machine(&executor, "a");

        vm.press_key("UP").await.unwrap();
        vm.keyboard_put_scancode(&[0x1E, 0x9E]).await.unwrap();

        assert_eq!(
            executor.commands(),
            vec![
                "vboxmanage controlvm \"a\" keyboardputscancode e0 48 e0 c8",
                "vboxmanage controlvm \"a\" keyboardputscancode 1e 9e",
            ]
        );
        assert!(matches!(vm.press_key("NOPE").await, Err(HostError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn trait_object_delegates() {
        let executor = ScriptedExecutor::new();
        executor.respond("showvminfo", RawOutput::success("VMState=\"saved\"\n"));
        let mut vm: Box<dyn MachineControl> = Box::new(machine(&executor, "a"));

        vm.info().await.unwrap();
        assert_eq!(vm.get("VMState"), Some("saved"));
        assert_eq!(vm.name().as_str(), "a");
    }
}
