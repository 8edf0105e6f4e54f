//! Scheduled rotation jobs

use chrono::{DateTime, Local};
use std::fmt;
use vmherd_util::{JobId, MachineName, MonotonicInstant};

/// What a job does when it fires
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobAction {
    /// Start the machine
    Start(MachineName),
    /// Power the machine off at the end of its work window
    Stop(MachineName),
    /// Refresh the inventory and plan a new cycle
    Rescan,
}

impl JobAction {
    /// Machine the job acts on, if any
    pub fn target(&self) -> Option<&MachineName> {
        match self {
            JobAction::Start(name) | JobAction::Stop(name) => Some(name),
            JobAction::Rescan => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobAction::Start(_) => "start",
            JobAction::Stop(_) => "stop",
            JobAction::Rescan => "rescan",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(name) => write!(f, "{} {}", self.kind(), name),
            None => f.write_str(self.kind()),
        }
    }
}

/// A unit of scheduled work. The fire time never changes once created.
#[derive(Debug, Clone)]
pub struct RotationJob {
    pub id: JobId,
    pub action: JobAction,
    pub fire_at: MonotonicInstant,
    /// Wall-clock estimate of `fire_at`, for logs
    pub fire_at_wall: DateTime<Local>,
    pub label: String,
}

impl RotationJob {
    pub fn new(
        action: JobAction,
        fire_at: MonotonicInstant,
        fire_at_wall: DateTime<Local>,
    ) -> Self {
        let label = format!(
            "{} at {}",
            action,
            vmherd_util::format_datetime_full(&fire_at_wall)
        );
        Self {
            id: JobId::new(),
            action,
            fire_at,
            fire_at_wall,
            label,
        }
    }

    pub fn is_due(&self, now: MonotonicInstant) -> bool {
        self.fire_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn action_display_and_target() {
        let start = JobAction::Start(MachineName::new("win10-a"));
        assert_eq!(start.to_string(), "start win10-a");
        assert_eq!(start.target(), Some(&MachineName::new("win10-a")));

        assert_eq!(JobAction::Rescan.to_string(), "rescan");
        assert_eq!(JobAction::Rescan.target(), None);
    }

    #[test]
    fn label_names_action() {
        let now = MonotonicInstant::now();
        let job = RotationJob::new(
            JobAction::Stop(MachineName::new("b")),
            now + Duration::from_secs(10),
            vmherd_util::now(),
        );

        assert!(job.label.starts_with("stop b at "));
        assert!(!job.is_due(now));
        assert!(job.is_due(now + Duration::from_secs(10)));
    }
}
