// MIT License - Copyright (c) 2026 Peter Wright
// Panel state snapshot

use std::collections::BTreeMap;
use std::fmt;

use crate::devices::{OutputStatus, PartitionStatusFlags, SystemStatusFlags, ZoneStatusFlags};
use crate::event::PanelEvent;

/// Lifecycle of one panel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Polling,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Polling => "polling",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded contents of one status frame.
///
/// Any subset of fields may be present. Entries are kept in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub system: Option<SystemStatusFlags>,
    pub partitions: Vec<(u32, PartitionStatusFlags)>,
    pub zones: Vec<(u32, ZoneStatusFlags)>,
    pub outputs: Vec<(u32, OutputStatus)>,
}

impl StatusUpdate {
    pub fn is_empty(&self) -> bool {
        self.system.is_none()
            && self.partitions.is_empty()
            && self.zones.is_empty()
            && self.outputs.is_empty()
    }
}

/// Last known state of every panel entity.
///
/// Only the protocol engine mutates this; everyone else sees clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    pub system: Option<SystemStatusFlags>,
    pub partitions: BTreeMap<u32, PartitionStatusFlags>,
    pub zones: BTreeMap<u32, ZoneStatusFlags>,
    pub outputs: BTreeMap<u32, OutputStatus>,
    pub connection: ConnectionState,
    /// True only while the engine is polling.
    pub fresh: bool,
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone(&self, id: u32) -> Option<ZoneStatusFlags> {
        self.zones.get(&id).copied()
    }

    pub fn partition(&self, id: u32) -> Option<PartitionStatusFlags> {
        self.partitions.get(&id).copied()
    }

    pub fn output(&self, id: u32) -> Option<OutputStatus> {
        self.outputs.get(&id).copied()
    }

    /// Number of known entities (the system counts as one).
    pub fn entity_count(&self) -> usize {
        self.system.iter().count() + self.partitions.len() + self.zones.len() + self.outputs.len()
    }

    /// Merge a decoded update, returning one event per changed value.
    ///
    /// Events come out in the order the update lists its fields.
    pub fn apply(&mut self, update: &StatusUpdate) -> Vec<PanelEvent> {
        let mut events = Vec::new();

        if let Some(new) = update.system {
            let previous = self.system.replace(new);
            if previous != Some(new) {
                events.push(PanelEvent::SystemChanged { previous, new });
            }
        }
        for &(id, new) in &update.partitions {
            let previous = self.partitions.insert(id, new);
            if previous != Some(new) {
                events.push(PanelEvent::PartitionChanged { id, previous, new });
            }
        }
        for &(id, new) in &update.zones {
            let previous = self.zones.insert(id, new);
            if previous != Some(new) {
                events.push(PanelEvent::ZoneChanged { id, previous, new });
            }
        }
        for &(id, new) in &update.outputs {
            let previous = self.outputs.insert(id, new);
            if previous != Some(new) {
                events.push(PanelEvent::OutputChanged { id, previous, new });
            }
        }
        events
    }

    /// One synthetic event per known entity, for bringing a new subscriber up to date.
    pub fn replay_events(&self) -> Vec<PanelEvent> {
        let mut events = Vec::with_capacity(self.entity_count());
        if let Some(new) = self.system {
            events.push(PanelEvent::SystemChanged { previous: None, new });
        }
        events.extend(self.partitions.iter().map(|(&id, &new)| PanelEvent::PartitionChanged {
            id,
            previous: None,
            new,
        }));
        events.extend(self.zones.iter().map(|(&id, &new)| PanelEvent::ZoneChanged {
            id,
            previous: None,
            new,
        }));
        events.extend(self.outputs.iter().map(|(&id, &new)| PanelEvent::OutputChanged {
            id,
            previous: None,
            new,
        }));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(entries: &[(u32, ZoneStatusFlags)]) -> StatusUpdate {
        StatusUpdate {
            zones: entries.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_observation_has_no_previous() {
        let mut state = PanelState::new();
        let events = state.apply(&zones(&[(1, ZoneStatusFlags::empty())]));
        assert_eq!(
            events,
            vec![PanelEvent::ZoneChanged {
                id: 1,
                previous: None,
                new: ZoneStatusFlags::empty()
            }]
        );
    }

    #[test]
    fn test_zone_open_emits_exactly_one_event() {
        let mut state = PanelState::new();
        state.apply(&zones(&[(3, ZoneStatusFlags::empty()), (4, ZoneStatusFlags::empty())]));

        let events = state.apply(&zones(&[
            (3, ZoneStatusFlags::OPEN),
            (4, ZoneStatusFlags::empty()),
        ]));
        assert_eq!(
            events,
            vec![PanelEvent::ZoneChanged {
                id: 3,
                previous: Some(ZoneStatusFlags::empty()),
                new: ZoneStatusFlags::OPEN
            }]
        );
        assert_eq!(state.zone(3), Some(ZoneStatusFlags::OPEN));
    }

    #[test]
    fn test_unchanged_update_is_silent() {
        let mut state = PanelState::new();
        let update = StatusUpdate {
            system: Some(SystemStatusFlags::AC_FAILURE),
            partitions: vec![(1, PartitionStatusFlags::READY)],
            outputs: vec![(2, OutputStatus::On)],
            ..Default::default()
        };
        assert_eq!(state.apply(&update).len(), 3);
        assert!(state.apply(&update).is_empty());
    }

    #[test]
    fn test_event_order_follows_field_order() {
        let mut state = PanelState::new();
        let update = StatusUpdate {
            system: Some(SystemStatusFlags::empty()),
            partitions: vec![(1, PartitionStatusFlags::READY)],
            zones: vec![(2, ZoneStatusFlags::OPEN), (1, ZoneStatusFlags::empty())],
            outputs: vec![(1, OutputStatus::Off)],
        };
        let topics: Vec<_> = state.apply(&update).iter().map(|e| e.topic()).collect();
        assert_eq!(
            topics,
            vec!["system-changed", "partition-changed", "zone-changed", "zone-changed", "output-changed"]
        );
    }

    #[test]
    fn test_replay_covers_every_entity() {
        let mut state = PanelState::new();
        state.apply(&StatusUpdate {
            system: Some(SystemStatusFlags::empty()),
            partitions: vec![(1, PartitionStatusFlags::READY), (2, PartitionStatusFlags::ARMED)],
            zones: vec![(1, ZoneStatusFlags::OPEN)],
            outputs: vec![(1, OutputStatus::Pulsed)],
        });
        let replay = state.replay_events();
        assert_eq!(replay.len(), state.entity_count());
        assert_eq!(replay.len(), 5);
        assert!(replay.iter().all(|e| e.is_state_change()));
    }

    #[test]
    fn test_empty_state_replays_nothing() {
        assert!(PanelState::new().replay_events().is_empty());
    }
}
