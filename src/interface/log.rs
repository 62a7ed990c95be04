// MIT License - Copyright (c) 2026 Peter Wright
// Event log front-end

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{CommandSink, Interface};
use crate::config::{Labels, LogConfig};
use crate::error::Result;
use crate::event::PanelEvent;

/// Writes every event through `tracing` using labels and flag names.
pub struct LogInterface {
    name: String,
    labels: Labels,
    verbose: bool,
}

impl LogInterface {
    pub fn new(config: LogConfig, labels: Labels) -> Self {
        Self {
            name: "log".into(),
            labels,
            verbose: config.verbose,
        }
    }

    /// One log line for an event, or `None` when there is nothing worth saying.
    pub fn describe(&self, event: &PanelEvent) -> Option<String> {
        let subject = match event {
            PanelEvent::ZoneChanged { id, .. } => self.labels.zone(*id),
            PanelEvent::PartitionChanged { id, .. } => self.labels.partition(*id),
            PanelEvent::OutputChanged { id, new, .. } => {
                return Some(format!("{}: {}", self.labels.output(*id), new));
            }
            PanelEvent::SystemChanged { .. } => "System".to_string(),
            PanelEvent::ConnectionChanged { previous, new } => {
                return Some(format!("Panel connection {} -> {}", previous, new));
            }
            PanelEvent::CommandResult { origin, command, outcome } => {
                return Some(match outcome.reason() {
                    Some(reason) => format!("'{}' from {}: {} ({})", command, origin, outcome.as_str(), reason),
                    None => format!("'{}' from {}: {}", command, origin, outcome.as_str()),
                });
            }
        };

        let (set, unset) = event.flag_changes();
        if set.is_empty() && unset.is_empty() {
            return None;
        }
        let names: Vec<&str> = set.into_iter().chain(unset).collect();
        Some(format!("{}: {}", subject, names.join(", ")))
    }
}

#[async_trait]
impl Interface for LogInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _commands: CommandSink) -> Result<()> {
        info!("Event log enabled{}", if self.verbose { " (verbose)" } else { "" });
        Ok(())
    }

    async fn receive_event(&self, event: &PanelEvent) -> Result<()> {
        let Some(line) = self.describe(event) else {
            return Ok(());
        };
        match event {
            PanelEvent::CommandResult { outcome, .. } if !outcome.is_success() => warn!("{}", line),
            PanelEvent::ZoneChanged { previous: None, .. } if !self.verbose => debug!("{}", line),
            _ => info!("{}", line),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Action, Command, CommandOutcome, Target};
    use crate::devices::{OutputStatus, PartitionStatusFlags, ZoneStatusFlags};
    use crate::state::ConnectionState;

    fn log_interface() -> LogInterface {
        let mut labels = Labels::default();
        labels.zones.insert(3, "Back door".into());
        labels.partitions.insert(1, "House".into());
        LogInterface::new(LogConfig { verbose: false }, labels)
    }

    #[test]
    fn test_describes_flag_changes() {
        let log = log_interface();
        let event = PanelEvent::ZoneChanged {
            id: 3,
            previous: Some(ZoneStatusFlags::OPEN),
            new: ZoneStatusFlags::TAMPER,
        };
        assert_eq!(log.describe(&event).unwrap(), "Back door: Tamper, Closed");

        let event = PanelEvent::PartitionChanged {
            id: 1,
            previous: Some(PartitionStatusFlags::READY),
            new: PartitionStatusFlags::READY | PartitionStatusFlags::ARMED,
        };
        assert_eq!(log.describe(&event).unwrap(), "House: Armed");
    }

    #[test]
    fn test_describes_other_events() {
        let log = log_interface();
        let output = PanelEvent::OutputChanged {
            id: 4,
            previous: None,
            new: OutputStatus::On,
        };
        assert_eq!(log.describe(&output).unwrap(), "Output 4: on");

        let conn = PanelEvent::ConnectionChanged {
            previous: ConnectionState::Polling,
            new: ConnectionState::Failed,
        };
        assert_eq!(log.describe(&conn).unwrap(), "Panel connection polling -> failed");

        let result = PanelEvent::CommandResult {
            origin: "mqtt".into(),
            command: Command::new(Target::Partition(1), Action::Arm, None).unwrap(),
            outcome: CommandOutcome::TimedOut,
        };
        let line = log.describe(&result).unwrap();
        assert!(line.starts_with("'arm partition 1' from mqtt: timed_out"));
    }

    #[test]
    fn test_quiet_replay_of_idle_zone() {
        let log = log_interface();
        let event = PanelEvent::ZoneChanged {
            id: 7,
            previous: None,
            new: ZoneStatusFlags::empty(),
        };
        assert!(log.describe(&event).is_none());
    }
}
