//! Scripted executor for unit tests

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::escape::EscapeMode;
use crate::runner::{CommandExecutor, RawOutput, RunnerConfig, VBoxManage};

/// Records command lines and answers with the first response whose
/// needle appears in the line. Unmatched lines succeed with no output.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    responses: Arc<Mutex<Vec<(String, RawOutput)>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, needle: &str, output: RawOutput) {
        self.responses
            .lock()
            .unwrap()
            .push((needle.to_string(), output));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn tool(&self, mode: EscapeMode) -> VBoxManage {
        VBoxManage::new(RunnerConfig::new("vboxmanage", mode), Arc::new(self.clone()))
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command_line: &str) -> std::io::Result<RawOutput> {
        self.commands.lock().unwrap().push(command_line.to_string());

        Ok(self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| command_line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| RawOutput::success("")))
    }
}
