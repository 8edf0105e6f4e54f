//! Mock hypervisor for testing

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vmherd_api::{InventoryEntry, MachineInfo, StartMode, TOP_LEVEL_GROUP};
use vmherd_util::{MachineId, MachineName, MonotonicInstant};

use crate::{HostError, HostResult, Hypervisor, InvocationFailure, MachineControl};

/// A call observed by the mock, in the order it was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListInventory,
    Info(MachineName),
    Start(MachineName, StartMode),
    Stop(MachineName),
    PowerOff(MachineName),
    IsRunning(MachineName),
}

/// Mock machine state
#[derive(Debug, Clone)]
pub struct MockMachine {
    pub id: MachineId,
    pub name: MachineName,
    pub info: MachineInfo,
}

#[derive(Default)]
struct MockState {
    machines: Mutex<Vec<MockMachine>>,
    calls: Mutex<Vec<(MonotonicInstant, MockCall)>>,
    fail_start: Mutex<HashSet<MachineName>>,
    fail_poweroff: Mutex<HashSet<MachineName>>,
    fail_info: Mutex<HashSet<MachineName>>,
    fail_list: Mutex<bool>,
    start_delay: Mutex<Option<Duration>>,
    clock: AtomicU32,
}

impl MockState {
    fn record(&self, call: MockCall) {
        self.calls
            .lock()
            .unwrap()
            .push((MonotonicInstant::now(), call));
    }

    /// Strictly increasing state-change timestamps
    fn next_timestamp(&self) -> String {
        let tick = 10_000 + self.clock.fetch_add(1, Ordering::SeqCst);
        format!(
            "2030-01-01T{:02}:{:02}:{:02}.000000000",
            tick / 3600,
            (tick / 60) % 60,
            tick % 60
        )
    }

    fn set_state(&self, name: &MachineName, state: &str) {
        let stamp = self.next_timestamp();
        let mut machines = self.machines.lock().unwrap();
        if let Some(machine) = machines.iter_mut().find(|m| &m.name == name) {
            machine.info.insert_value("VMState", Some(state.to_string()));
            machine.info.insert_value("VMStateChangeTime", Some(stamp));
        }
    }

    fn state_of(&self, name: &MachineName) -> Option<String> {
        self.machines
            .lock()
            .unwrap()
            .iter()
            .find(|m| &m.name == name)
            .and_then(|m| m.info.get("VMState").map(str::to_string))
    }
}

fn mock_failure(command: &str, name: &MachineName, message: &str) -> HostError {
    HostError::Invocation(InvocationFailure {
        command_line: format!("mock {} {}", command, name),
        exit_code: Some(1),
        message: message.to_string(),
        stdout: String::new(),
        stderr: message.to_string(),
    })
}

/// Mock hypervisor for unit/integration testing
#[derive(Clone, Default)]
pub struct MockHypervisor {
    state: Arc<MockState>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a top-level machine in `state` whose last change was at `changed_at`
    pub fn add_machine(&self, name: &str, state: &str, changed_at: &str) -> &Self {
        self.add_machine_in_group(name, state, changed_at, TOP_LEVEL_GROUP)
    }

    pub fn add_machine_in_group(
        &self,
        name: &str,
        state: &str,
        changed_at: &str,
        group: &str,
    ) -> &Self {
        let mut info = MachineInfo::new();
        info.insert_value("name", Some(name.to_string()));
        info.insert_value("VMState", Some(state.to_string()));
        info.insert_value("VMStateChangeTime", Some(changed_at.to_string()));
        info.insert_value("groups", Some(group.to_string()));
        info.insert_value("ostype", Some("Ubuntu (64-bit)".to_string()));

        let mut machines = self.state.machines.lock().unwrap();
        let id = MachineId::new(format!("00000000-0000-0000-0000-{:012}", machines.len()));
        machines.push(MockMachine {
            id,
            name: MachineName::new(name),
            info,
        });
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Calls with the instant they were issued
    pub fn timed_calls(&self) -> Vec<(MonotonicInstant, MockCall)> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().unwrap().clear();
    }

    pub fn state_of(&self, name: &str) -> Option<String> {
        self.state.state_of(&MachineName::new(name))
    }

    pub fn running_count(&self) -> usize {
        self.state
            .machines
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.info.get("VMState") == Some("running"))
            .count()
    }

    pub fn fail_start(&self, name: &str) {
        self.state
            .fail_start
            .lock()
            .unwrap()
            .insert(MachineName::new(name));
    }

    pub fn fail_poweroff(&self, name: &str) {
        self.state
            .fail_poweroff
            .lock()
            .unwrap()
            .insert(MachineName::new(name));
    }

    pub fn fail_info(&self, name: &str) {
        self.state
            .fail_info
            .lock()
            .unwrap()
            .insert(MachineName::new(name));
    }

    pub fn set_fail_list(&self, fail: bool) {
        *self.state.fail_list.lock().unwrap() = fail;
    }

    /// Make every start hang for `delay` before completing
    pub fn set_start_delay(&self, delay: Option<Duration>) {
        *self.state.start_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    async fn list_inventory(&self) -> HostResult<Vec<InventoryEntry>> {
        self.state.record(MockCall::ListInventory);

        if *self.state.fail_list.lock().unwrap() {
            return Err(HostError::Internal("Mock list failure".into()));
        }

        Ok(self
            .state
            .machines
            .lock()
            .unwrap()
            .iter()
            .map(|m| InventoryEntry {
                id: m.id.clone(),
                name: m.name.clone(),
                running: m.info.get("VMState") == Some("running"),
            })
            .collect())
    }

    fn controller_for(&self, name: &MachineName) -> Box<dyn MachineControl> {
        Box::new(MockMachineControl {
            name: name.clone(),
            state: self.state.clone(),
            cached: MachineInfo::new(),
        })
    }
}

/// Controller handed out by [`MockHypervisor`]
pub struct MockMachineControl {
    name: MachineName,
    state: Arc<MockState>,
    cached: MachineInfo,
}

#[async_trait]
impl MachineControl for MockMachineControl {
    fn name(&self) -> &MachineName {
        &self.name
    }

    async fn info(&mut self) -> HostResult<MachineInfo> {
        self.state.record(MockCall::Info(self.name.clone()));

        if self.state.fail_info.lock().unwrap().contains(&self.name) {
            return Err(mock_failure("showvminfo", &self.name, "Mock info failure"));
        }

        let info = self
            .state
            .machines
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.name == self.name)
            .map(|m| m.info.clone())
            .ok_or_else(|| {
                mock_failure(
                    "showvminfo",
                    &self.name,
                    "Could not find a registered machine",
                )
            })?;

        self.cached = info.clone();
        Ok(info)
    }

    fn cached_info(&self) -> &MachineInfo {
        &self.cached
    }

    async fn start(&self, mode: StartMode) -> HostResult<String> {
        self.state.record(MockCall::Start(self.name.clone(), mode));

        let delay = *self.state.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_start.lock().unwrap().contains(&self.name) {
            return Err(mock_failure("startvm", &self.name, "Mock start failure"));
        }

        self.state.set_state(&self.name, "running");
        Ok(format!(
            "VM \"{}\" has been successfully started.",
            self.name
        ))
    }

    async fn stop(&self) -> HostResult<String> {
        self.state.record(MockCall::Stop(self.name.clone()));
        self.state.set_state(&self.name, "saved");
        Ok(String::new())
    }

    async fn poweroff(&self) -> HostResult<String> {
        self.state.record(MockCall::PowerOff(self.name.clone()));

        if self.state.fail_poweroff.lock().unwrap().contains(&self.name) {
            return Err(mock_failure("controlvm", &self.name, "Mock poweroff failure"));
        }

        self.state.set_state(&self.name, "poweroff");
        Ok(String::new())
    }

    async fn is_running(&self) -> HostResult<bool> {
        self.state.record(MockCall::IsRunning(self.name.clone()));
        Ok(self.state.state_of(&self.name).as_deref() == Some("running"))
    }
}
