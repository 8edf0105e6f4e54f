//! VirtualBox implementation of the hypervisor contract

use async_trait::async_trait;
use tracing::debug;
use vmherd_api::InventoryEntry;
use vmherd_host_api::{HostResult, Hypervisor, MachineControl};
use vmherd_util::MachineName;

use crate::invocation::Invocation;
use crate::machine::VBoxMachine;
use crate::parse::parse_list;
use crate::runner::VBoxManage;

/// Hypervisor backed by the `VBoxManage` CLI
#[derive(Clone)]
pub struct VBoxHost {
    tool: VBoxManage,
}

impl VBoxHost {
    pub fn new(tool: VBoxManage) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &VBoxManage {
        &self.tool
    }

    /// Concrete controller, with the operations beyond [`MachineControl`]
    pub fn machine(&self, name: &MachineName) -> VBoxMachine {
        VBoxMachine::new(name.clone(), self.tool.clone())
    }
}

#[async_trait]
impl Hypervisor for VBoxHost {
    async fn list_inventory(&self) -> HostResult<Vec<InventoryEntry>> {
        let running = parse_list(
            &self
                .tool
                .run(&Invocation::new("list").arg("runningvms"))
                .await?,
        );
        let all = parse_list(&self.tool.run(&Invocation::new("list").arg("vms")).await?);

        let inventory: Vec<_> = all
            .into_iter()
            .map(|entry| InventoryEntry {
                running: running.contains_id(&entry.id),
                id: entry.id,
                name: entry.name,
            })
            .collect();

        debug!(
            machines = inventory.len(),
            running = running.len(),
            "Listed inventory"
        );
        Ok(inventory)
    }

    fn controller_for(&self, name: &MachineName) -> Box<dyn MachineControl> {
        Box::new(self.machine(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::EscapeMode;
    use crate::runner::RawOutput;
    use crate::testing::ScriptedExecutor;

    #[tokio::test]
    async fn inventory_cross_references_running_list() {
        let executor = ScriptedExecutor::new();
        executor.respond("list runningvms", RawOutput::success("\"b\" {2}\n"));
        executor.respond(
            "list vms",
            RawOutput::success("\"a\" {1}\n\"b\" {2}\n\"c d\" {3}\n"),
        );
        let host = VBoxHost::new(executor.tool(EscapeMode::Posix));

        let inventory = host.list_inventory().await.unwrap();

        let summary: Vec<_> = inventory
            .iter()
            .map(|e| (e.name.as_str(), e.running))
            .collect();
        assert_eq!(summary, vec![("a", false), ("b", true), ("c d", false)]);
        assert_eq!(
            executor.commands(),
            vec!["vboxmanage list runningvms", "vboxmanage list vms"]
        );
    }

    #[tokio::test]
    async fn inventory_fails_when_listing_fails() {
        let executor = ScriptedExecutor::new();
        executor.respond("list runningvms", RawOutput::failure(1, "VBoxManage: error: boom"));
        let host = VBoxHost::new(executor.tool(EscapeMode::Posix));

        assert!(host.list_inventory().await.is_err());
        assert_eq!(executor.commands().len(), 1);
    }

    #[tokio::test]
    async fn controllers_are_independent() {
        let executor = ScriptedExecutor::new();
        executor.respond("showvminfo \"a\"", RawOutput::success("VMState=\"running\"\n"));
        let host = VBoxHost::new(executor.tool(EscapeMode::Posix));

        let mut first = host.controller_for(&MachineName::new("a"));
        let second = host.controller_for(&MachineName::new("a"));
        first.info().await.unwrap();

        assert_eq!(first.get("VMState"), Some("running"));
        assert!(second.get("VMState").is_none());
    }
}
