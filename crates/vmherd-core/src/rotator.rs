//! Async driver for the rotation engine
//!
//! Owns the engine, sleeps until the next job is due, and runs each job
//! body as its own task so a hung command only stalls that job.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vmherd_api::StartMode;
use vmherd_config::RotationSettings;
use vmherd_host_api::{HostResult, Hypervisor};
use vmherd_util::{MachineName, MonotonicInstant};

use crate::engine::RotationEngine;
use crate::events::RotationEvent;
use crate::job::{JobAction, RotationJob};
use crate::selection::MachineStatus;

enum RotatorCommand {
    RunCycle,
    Cancel(MachineName),
    Shutdown,
}

/// Result of one job body
enum JobOutcome {
    Refreshed(HostResult<Vec<MachineStatus>>),
    Started(MachineName, HostResult<()>),
    Stopped(MachineName, HostResult<()>),
}

/// Control handle for a running [`Rotator`]
#[derive(Clone)]
pub struct RotatorHandle {
    commands: mpsc::UnboundedSender<RotatorCommand>,
    events: broadcast::Sender<RotationEvent>,
}

impl RotatorHandle {
    /// Run a cycle now. Returns false if the rotator has stopped.
    pub fn run_cycle(&self) -> bool {
        self.commands.send(RotatorCommand::RunCycle).is_ok()
    }

    /// Drop every queued job for `name`
    pub fn cancel(&self, name: MachineName) -> bool {
        self.commands.send(RotatorCommand::Cancel(name)).is_ok()
    }

    /// Stop the rotator; in-flight job tasks are aborted
    pub fn shutdown(&self) {
        let _ = self.commands.send(RotatorCommand::Shutdown);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.events.subscribe()
    }
}

/// The rotation scheduler
pub struct Rotator {
    host: Arc<dyn Hypervisor>,
    engine: RotationEngine,
    start_mode: StartMode,
    commands: mpsc::UnboundedReceiver<RotatorCommand>,
    events: broadcast::Sender<RotationEvent>,
    tasks: JoinSet<JobOutcome>,
}

impl Rotator {
    pub fn new(host: Arc<dyn Hypervisor>, settings: RotationSettings) -> (Self, RotatorHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);

        let handle = RotatorHandle {
            commands: command_tx,
            events: event_tx.clone(),
        };

        let rotator = Self {
            host,
            start_mode: settings.start_mode,
            engine: RotationEngine::new(settings),
            commands: command_rx,
            events: event_tx,
            tasks: JoinSet::new(),
        };

        (rotator, handle)
    }

    /// Run until shut down. The first cycle starts immediately.
    pub async fn run(mut self) {
        let settings = self.engine.settings();
        info!(
            running_limit = settings.running_limit,
            work_secs = settings.work_duration.as_secs(),
            stagger_secs = settings.start_stagger.as_secs(),
            cooldown_secs = settings.restart_cooldown.as_secs(),
            group = %settings.group,
            "Rotation scheduler started"
        );

        let events = self.engine.request_cycle(MonotonicInstant::now());
        self.publish(events);

        loop {
            self.dispatch_due();

            let next_fire = self.engine.next_fire();
            let wake = async move {
                match next_fire {
                    Some(at) => tokio::time::sleep_until(at.into_tokio()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(RotatorCommand::RunCycle) => {
                        let events = self.engine.request_cycle(MonotonicInstant::now());
                        self.publish(events);
                    }
                    Some(RotatorCommand::Cancel(name)) => {
                        let events = self.engine.cancel(&name);
                        self.publish(events);
                    }
                    Some(RotatorCommand::Shutdown) | None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(outcome) => self.on_outcome(outcome),
                        Err(e) => error!(error = %e, "Rotation job task failed"),
                    }
                }
                _ = wake => {}
            }
        }

        let in_flight = self.tasks.len();
        self.tasks.abort_all();
        info!(in_flight, "Rotation scheduler stopped");
    }

    fn dispatch_due(&mut self) {
        let (ready, events) = self.engine.fire_due(MonotonicInstant::now());
        self.publish(events);

        for job in ready {
            self.spawn_job(job);
        }
    }

    fn spawn_job(&mut self, job: RotationJob) {
        let host = self.host.clone();

        match job.action {
            JobAction::Rescan => {
                self.tasks
                    .spawn(async move { JobOutcome::Refreshed(refresh(host.as_ref()).await) });
            }
            JobAction::Start(name) => {
                let mode = self.start_mode;
                self.tasks.spawn(async move {
                    let result = host.controller_for(&name).start(mode).await.map(drop);
                    JobOutcome::Started(name, result)
                });
            }
            JobAction::Stop(name) => {
                self.tasks.spawn(async move {
                    let result = host.controller_for(&name).poweroff().await.map(drop);
                    JobOutcome::Stopped(name, result)
                });
            }
        }
    }

    fn on_outcome(&mut self, outcome: JobOutcome) {
        let now = MonotonicInstant::now();
        let events = match outcome {
            JobOutcome::Refreshed(result) => self.engine.on_refresh_finished(now, result),
            JobOutcome::Started(name, result) => self.engine.on_start_finished(now, name, result),
            JobOutcome::Stopped(name, result) => self.engine.on_stop_finished(now, name, result),
        };
        self.publish(events);
    }

    fn publish(&self, events: Vec<RotationEvent>) {
        for event in events {
            log_event(&event);
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

/// List the inventory and refresh each machine's info, one at a time
async fn refresh(host: &dyn Hypervisor) -> HostResult<Vec<MachineStatus>> {
    let inventory = host.list_inventory().await?;
    let mut machines = Vec::with_capacity(inventory.len());

    for entry in inventory {
        let mut controller = host.controller_for(&entry.name);
        let info = controller.info().await.inspect_err(|e| {
            warn!(machine = %entry.name, error = %e, "Failed to refresh machine info");
        })?;
        machines.push(MachineStatus::from_info(entry.name, &info));
    }

    Ok(machines)
}

fn log_event(event: &RotationEvent) {
    match event {
        RotationEvent::JobScheduled { job_id, label, .. } => {
            info!(job_id = %job_id, "Scheduled {}", label);
        }
        RotationEvent::JobFired { job_id, action, .. } => {
            debug!(job_id = %job_id, action = %action, "Job fired");
        }
        RotationEvent::RescanCoalesced => {
            debug!("Rescan folded into the refresh in flight");
        }
        RotationEvent::CyclePlanned {
            in_scope,
            running,
            reserved,
            selected,
        } => {
            info!(
                in_scope,
                running,
                reserved,
                selected = selected.len(),
                "Cycle planned"
            );
        }
        RotationEvent::CycleAbandoned { error, retry_in } => {
            warn!(error = %error, retry_secs = retry_in.as_secs(), "Cycle abandoned");
        }
        RotationEvent::MachineStarted { name, stop_in } => {
            info!(machine = %name, stop_in_secs = stop_in.as_secs(), "Machine started");
        }
        RotationEvent::StartFailed { name, error } => {
            warn!(machine = %name, error = %error, "Start failed");
        }
        RotationEvent::MachineStopped { name } => {
            info!(machine = %name, "Machine powered off");
        }
        RotationEvent::StopFailed { name, error } => {
            warn!(machine = %name, error = %error, "Power-off failed");
        }
        RotationEvent::JobsCancelled { name, count } => {
            info!(machine = %name, count, "Cancelled queued jobs");
        }
    }
}
