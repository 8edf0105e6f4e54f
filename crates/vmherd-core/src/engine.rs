//! Rotation engine
//!
//! A synchronous state machine over the job queue. The driver feeds it the
//! current time and the outcome of each job; the engine decides what to
//! queue next. Per machine:
//!
//! Idle -> ScheduledStart -> Starting -> ScheduledStop -> Stopping -> Idle
//!
//! Every finished stop queues a rescan after the cooldown, whether or not
//! the power-off succeeded.

use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use vmherd_config::RotationSettings;
use vmherd_host_api::HostError;
use vmherd_util::{MachineName, MonotonicInstant, wall_clock_after};

use crate::events::RotationEvent;
use crate::job::{JobAction, RotationJob};
use crate::queue::JobQueue;
use crate::selection::{MachinePhase, MachineStatus, plan_cycle};

/// The rotation policy engine
pub struct RotationEngine {
    settings: RotationSettings,
    queue: JobQueue,
    phases: HashMap<MachineName, MachinePhase>,
    refresh_in_flight: bool,
    /// A rescan came due while a refresh was in flight
    rescan_requested: bool,
}

impl RotationEngine {
    pub fn new(settings: RotationSettings) -> Self {
        Self {
            settings,
            queue: JobQueue::new(),
            phases: HashMap::new(),
            refresh_in_flight: false,
            rescan_requested: false,
        }
    }

    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    pub fn phase(&self, name: &MachineName) -> Option<MachinePhase> {
        self.phases.get(name).copied()
    }

    pub fn pending_jobs(&self) -> impl Iterator<Item = &RotationJob> {
        self.queue.iter()
    }

    pub fn next_fire(&self) -> Option<MonotonicInstant> {
        self.queue.next_fire()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight
    }

    /// Queue `action` after `delay`. A delay past the clock's range queues nothing.
    fn schedule(
        &mut self,
        action: JobAction,
        now: MonotonicInstant,
        delay: Duration,
    ) -> Option<RotationEvent> {
        let Some(fire_at) = now.checked_add(delay) else {
            warn!(
                action = %action,
                delay_secs = delay.as_secs(),
                "Delay out of range, job not scheduled"
            );
            return None;
        };

        let job = RotationJob::new(action, fire_at, wall_clock_after(delay));
        let event = RotationEvent::JobScheduled {
            job_id: job.id,
            action: job.action.clone(),
            fire_at: job.fire_at_wall,
            label: job.label.clone(),
        };
        self.queue.push(job);
        Some(event)
    }

    /// Queue an immediate cycle, unless one is already due
    pub fn request_cycle(&mut self, now: MonotonicInstant) -> Vec<RotationEvent> {
        if self
            .queue
            .has_pending(|j| j.action == JobAction::Rescan && j.is_due(now))
        {
            debug!("Cycle already due");
            return Vec::new();
        }
        self.schedule(JobAction::Rescan, now, Duration::ZERO)
            .into_iter()
            .collect()
    }

    /// Take every due job for execution.
    ///
    /// At most one refresh runs at a time: a rescan that comes due while
    /// another is in flight is turned into a single follow-up rescan.
    pub fn fire_due(&mut self, now: MonotonicInstant) -> (Vec<RotationJob>, Vec<RotationEvent>) {
        let mut ready = Vec::new();
        let mut events = Vec::new();
        let mut rescan_in_batch = false;

        for job in self.queue.pop_due(now) {
            match &job.action {
                JobAction::Rescan => {
                    if rescan_in_batch {
                        events.push(RotationEvent::RescanCoalesced);
                        continue;
                    }
                    if self.refresh_in_flight {
                        self.rescan_requested = true;
                        events.push(RotationEvent::RescanCoalesced);
                        continue;
                    }
                    self.refresh_in_flight = true;
                    rescan_in_batch = true;
                }
                JobAction::Start(name) => {
                    self.phases.insert(name.clone(), MachinePhase::Starting);
                }
                JobAction::Stop(name) => {
                    self.phases.insert(name.clone(), MachinePhase::Stopping);
                }
            }

            events.push(RotationEvent::JobFired {
                job_id: job.id,
                action: job.action.clone(),
                label: job.label.clone(),
            });
            ready.push(job);
        }

        (ready, events)
    }

    /// Plan a cycle from a finished refresh.
    ///
    /// A failed refresh starts nothing and retries after the cooldown.
    pub fn on_refresh_finished(
        &mut self,
        now: MonotonicInstant,
        result: Result<Vec<MachineStatus>, HostError>,
    ) -> Vec<RotationEvent> {
        self.refresh_in_flight = false;
        let mut events = Vec::new();

        match result {
            Ok(machines) => {
                let plan = plan_cycle(&machines, &self.phases, &self.settings);

                events.push(RotationEvent::CyclePlanned {
                    in_scope: plan.in_scope,
                    running: plan.running,
                    reserved: plan.reserved,
                    selected: plan.starts.iter().map(|s| s.name.clone()).collect(),
                });

                for start in plan.starts {
                    let name = start.name.clone();
                    match self.schedule(JobAction::Start(start.name), now, start.offset) {
                        Some(event) => {
                            self.phases.insert(name, MachinePhase::ScheduledStart);
                            events.push(event);
                        }
                        None => {
                            self.phases.remove(&name);
                        }
                    }
                }
            }
            Err(e) => {
                let retry_in = self.settings.restart_cooldown;
                events.push(RotationEvent::CycleAbandoned {
                    error: e.to_string(),
                    retry_in,
                });
                events.extend(self.schedule(JobAction::Rescan, now, retry_in));
            }
        }

        if self.rescan_requested {
            self.rescan_requested = false;
            events.extend(self.schedule(JobAction::Rescan, now, Duration::ZERO));
        }

        events
    }

    /// A start job finished. Success queues the stop at the end of the work window.
    pub fn on_start_finished(
        &mut self,
        now: MonotonicInstant,
        name: MachineName,
        result: Result<(), HostError>,
    ) -> Vec<RotationEvent> {
        match result {
            Ok(()) => {
                let stop_in = self.settings.work_duration;
                let mut events = vec![RotationEvent::MachineStarted {
                    name: name.clone(),
                    stop_in,
                }];
                match self.schedule(JobAction::Stop(name.clone()), now, stop_in) {
                    Some(event) => {
                        self.phases.insert(name, MachinePhase::ScheduledStop);
                        events.push(event);
                    }
                    None => {
                        self.phases.remove(&name);
                    }
                }
                events
            }
            Err(e) => {
                self.phases.remove(&name);
                vec![RotationEvent::StartFailed {
                    name,
                    error: e.to_string(),
                }]
            }
        }
    }

    /// A stop job finished. Either way a rescan follows after the cooldown.
    pub fn on_stop_finished(
        &mut self,
        now: MonotonicInstant,
        name: MachineName,
        result: Result<(), HostError>,
    ) -> Vec<RotationEvent> {
        self.phases.remove(&name);

        let outcome = match result {
            Ok(()) => RotationEvent::MachineStopped { name },
            Err(e) => RotationEvent::StopFailed {
                name,
                error: e.to_string(),
            },
        };

        let cooldown = self.settings.restart_cooldown;
        let mut events = vec![outcome];
        events.extend(self.schedule(JobAction::Rescan, now, cooldown));
        events
    }

    /// Drop queued jobs for `name`. Commands already in flight still complete.
    pub fn cancel(&mut self, name: &MachineName) -> Vec<RotationEvent> {
        let count = self.queue.cancel_target(name);

        if self
            .phases
            .get(name)
            .is_some_and(|p| matches!(p, MachinePhase::ScheduledStart | MachinePhase::ScheduledStop))
        {
            self.phases.remove(name);
        }

        vec![RotationEvent::JobsCancelled {
            name: name.clone(),
            count,
        }]
    }
}
