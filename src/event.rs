// MIT License - Copyright (c) 2026 Peter Wright
// Gateway events

use crate::command::{Command, CommandOutcome};
use crate::devices::{OutputStatus, PartitionStatusFlags, SystemStatusFlags, ZoneStatusFlags};
use crate::state::ConnectionState;

/// Notification fanned out to interfaces.
///
/// State-change variants carry `previous: None` the first time an entity is
/// seen and in replays sent to newly registered interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    ZoneChanged {
        id: u32,
        previous: Option<ZoneStatusFlags>,
        new: ZoneStatusFlags,
    },
    PartitionChanged {
        id: u32,
        previous: Option<PartitionStatusFlags>,
        new: PartitionStatusFlags,
    },
    OutputChanged {
        id: u32,
        previous: Option<OutputStatus>,
        new: OutputStatus,
    },
    SystemChanged {
        previous: Option<SystemStatusFlags>,
        new: SystemStatusFlags,
    },
    ConnectionChanged {
        previous: ConnectionState,
        new: ConnectionState,
    },
    /// Final outcome of a submitted command. Delivered to `origin` only.
    CommandResult {
        origin: String,
        command: Command,
        outcome: CommandOutcome,
    },
}

impl PanelEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            PanelEvent::ZoneChanged { .. } => "zone-changed",
            PanelEvent::PartitionChanged { .. } => "partition-changed",
            PanelEvent::OutputChanged { .. } => "output-changed",
            PanelEvent::SystemChanged { .. } => "system-changed",
            PanelEvent::ConnectionChanged { .. } => "connection-changed",
            PanelEvent::CommandResult { outcome, .. } if outcome.is_success() => "command-ack",
            PanelEvent::CommandResult { .. } => "command-nack",
        }
    }

    /// Entity id for zone, partition and output events.
    pub fn entity_id(&self) -> Option<u32> {
        match self {
            PanelEvent::ZoneChanged { id, .. }
            | PanelEvent::PartitionChanged { id, .. }
            | PanelEvent::OutputChanged { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            PanelEvent::ZoneChanged { .. }
                | PanelEvent::PartitionChanged { .. }
                | PanelEvent::OutputChanged { .. }
                | PanelEvent::SystemChanged { .. }
        )
    }

    /// Name of the only interface that should see this event, if restricted.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            PanelEvent::CommandResult { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Flag names that became set and unset, for human-readable output.
    pub fn flag_changes(&self) -> (Vec<&'static str>, Vec<&'static str>) {
        match self {
            PanelEvent::ZoneChanged { previous, new, .. } => {
                let changed = ZoneStatusFlags::changed(previous.unwrap_or_default(), *new);
                (
                    ZoneStatusFlags::set_event_names(changed, *new),
                    ZoneStatusFlags::unset_event_names(changed, *new),
                )
            }
            PanelEvent::PartitionChanged { previous, new, .. } => {
                let changed = PartitionStatusFlags::changed(previous.unwrap_or_default(), *new);
                (
                    PartitionStatusFlags::set_event_names(changed, *new),
                    PartitionStatusFlags::unset_event_names(changed, *new),
                )
            }
            PanelEvent::SystemChanged { previous, new } => {
                let changed = SystemStatusFlags::changed(previous.unwrap_or_default(), *new);
                (
                    SystemStatusFlags::set_event_names(changed, *new),
                    SystemStatusFlags::unset_event_names(changed, *new),
                )
            }
            _ => (Vec::new(), Vec::new()),
        }
    }
}
