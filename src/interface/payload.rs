// MIT License - Copyright (c) 2026 Peter Wright
// JSON payloads shared by the network interfaces

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::command::{Action, Command, CommandOutcome, Target};
use crate::config::Labels;
use crate::devices::{OutputStatus, PartitionStatusFlags, SystemStatusFlags, ZoneStatusFlags};
use crate::error::Result;
use crate::event::PanelEvent;

pub const CMD_ACK: &str = "CMD_ACK";

pub fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneState {
    pub open: bool,
    pub tamper: bool,
    #[serde(rename = "lowBattery")]
    pub low_battery: bool,
    pub bypass: bool,
    pub alarm: bool,
}

impl From<ZoneStatusFlags> for ZoneState {
    fn from(flags: ZoneStatusFlags) -> Self {
        Self {
            open: flags.is_open(),
            tamper: flags.is_tamper(),
            low_battery: flags.is_low_battery(),
            bypass: flags.is_bypassed(),
            alarm: flags.is_alarm(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionState {
    #[serde(rename = "armAway")]
    pub arm_away: bool,
    #[serde(rename = "armStay")]
    pub arm_stay: bool,
    #[serde(rename = "armSleep")]
    pub arm_sleep: bool,
    pub ready: bool,
    pub alarm: bool,
    pub trouble: bool,
    #[serde(rename = "exitDelay")]
    pub exit_delay: bool,
    #[serde(rename = "entryDelay")]
    pub entry_delay: bool,
}

impl From<PartitionStatusFlags> for PartitionState {
    fn from(flags: PartitionStatusFlags) -> Self {
        Self {
            arm_away: flags.contains(PartitionStatusFlags::ARMED),
            arm_stay: flags.contains(PartitionStatusFlags::STAY_ARMED),
            arm_sleep: flags.contains(PartitionStatusFlags::SLEEP_ARMED),
            ready: flags.is_ready(),
            alarm: flags.is_alarm(),
            trouble: flags.is_trouble(),
            exit_delay: flags.contains(PartitionStatusFlags::EXIT_DELAY),
            entry_delay: flags.contains(PartitionStatusFlags::ENTRY_DELAY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemState {
    #[serde(rename = "acFailure")]
    pub ac_failure: bool,
    #[serde(rename = "lowBattery")]
    pub low_battery: bool,
    pub trouble: bool,
    #[serde(rename = "progMode")]
    pub prog_mode: bool,
}

impl From<SystemStatusFlags> for SystemState {
    fn from(flags: SystemStatusFlags) -> Self {
        Self {
            ac_failure: flags.is_ac_failure(),
            low_battery: flags.is_low_battery(),
            trouble: flags.has_trouble(),
            prog_mode: flags.is_prog_mode(),
        }
    }
}

/// Entity value inside an event payload. Outputs and the connection are plain strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Zone(ZoneState),
    Partition(PartitionState),
    System(SystemState),
    Output(&'static str),
    Connection(&'static str),
}

impl From<OutputStatus> for EntityState {
    fn from(status: OutputStatus) -> Self {
        EntityState::Output(status.as_str())
    }
}

// Published state changes: {now, op, id?, label?, state, previous?, set, unset}
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    pub now: u64,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub state: EntityState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<EntityState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<&'static str>,
}

impl EventPayload {
    /// Payload for a state or connection event; `None` for command results.
    pub fn from_event(event: &PanelEvent, labels: &Labels) -> Option<Self> {
        let (id, label, state, previous) = match event {
            PanelEvent::ZoneChanged { id, previous, new } => (
                Some(*id),
                Some(labels.zone(*id)),
                EntityState::Zone((*new).into()),
                previous.map(|p| EntityState::Zone(p.into())),
            ),
            PanelEvent::PartitionChanged { id, previous, new } => (
                Some(*id),
                Some(labels.partition(*id)),
                EntityState::Partition((*new).into()),
                previous.map(|p| EntityState::Partition(p.into())),
            ),
            PanelEvent::OutputChanged { id, previous, new } => (
                Some(*id),
                Some(labels.output(*id)),
                (*new).into(),
                previous.map(EntityState::from),
            ),
            PanelEvent::SystemChanged { previous, new } => (
                None,
                None,
                EntityState::System((*new).into()),
                previous.map(|p| EntityState::System(p.into())),
            ),
            PanelEvent::ConnectionChanged { previous, new } => (
                None,
                None,
                EntityState::Connection(new.as_str()),
                Some(EntityState::Connection(previous.as_str())),
            ),
            PanelEvent::CommandResult { .. } => return None,
        };
        let (set, unset) = event.flag_changes();
        Some(Self {
            now: now_epoch_ms(),
            op: event.topic(),
            id,
            label,
            state,
            previous,
            set,
            unset,
        })
    }
}

/// Topic suffix under which the latest value of an entity is retained.
pub fn entity_path(event: &PanelEvent) -> Option<String> {
    match event {
        PanelEvent::ZoneChanged { id, .. } => Some(format!("zones/{}", id)),
        PanelEvent::PartitionChanged { id, .. } => Some(format!("partitions/{}", id)),
        PanelEvent::OutputChanged { id, .. } => Some(format!("outputs/{}", id)),
        PanelEvent::SystemChanged { .. } => Some("system".into()),
        PanelEvent::ConnectionChanged { .. } => Some("connection".into()),
        PanelEvent::CommandResult { .. } => None,
    }
}

// Inbound command: {target, id?, action, code?}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CommandRequest {
    pub fn into_command(self) -> Result<Command> {
        let target = Target::from_parts(&self.target.to_ascii_lowercase(), self.id)?;
        let action = Action::from_str(&self.action)?;
        Command::new(target, action, self.code)
    }
}

impl From<&Command> for CommandRequest {
    // Echo form; the user code is never sent back.
    fn from(command: &Command) -> Self {
        let target = command.target();
        Self {
            target: target.kind().to_string(),
            id: target.id(),
            action: command.action().as_str().to_string(),
            code: None,
        }
    }
}

// CMD_ACK response
#[derive(Debug, Clone, Serialize)]
pub struct CmdAck {
    pub now: u64,
    pub op: &'static str,
    pub success: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub src: CommandRequest,
}

impl CmdAck {
    pub fn new(command: &Command, outcome: &CommandOutcome) -> Self {
        Self {
            now: now_epoch_ms(),
            op: CMD_ACK,
            success: outcome.is_success(),
            outcome: outcome.as_str(),
            reason: outcome.reason(),
            src: command.into(),
        }
    }

    /// Negative acknowledgement for a request that never became a command.
    pub fn invalid(src: CommandRequest, reason: String) -> Self {
        Self {
            now: now_epoch_ms(),
            op: CMD_ACK,
            success: false,
            outcome: CommandOutcome::Invalid(String::new()).as_str(),
            reason: Some(reason),
            src,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelErrorCode;
    use crate::state::ConnectionState;

    #[test]
    fn test_zone_event_payload() {
        let mut labels = Labels::default();
        labels.zones.insert(3, "Back door".into());
        let event = PanelEvent::ZoneChanged {
            id: 3,
            previous: Some(ZoneStatusFlags::empty()),
            new: ZoneStatusFlags::OPEN,
        };
        let payload = EventPayload::from_event(&event, &labels).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["op"], "zone-changed");
        assert_eq!(json["id"], 3);
        assert_eq!(json["label"], "Back door");
        assert_eq!(json["state"]["open"], true);
        assert_eq!(json["previous"]["open"], false);
        assert_eq!(json["set"][0], "Open");
        assert!(json.get("unset").is_none());
    }

    #[test]
    fn test_output_and_connection_are_strings() {
        let labels = Labels::default();
        let output = PanelEvent::OutputChanged {
            id: 2,
            previous: None,
            new: OutputStatus::Pulsed,
        };
        let json = serde_json::to_value(EventPayload::from_event(&output, &labels).unwrap()).unwrap();
        assert_eq!(json["state"], "pulsed");
        assert_eq!(json["label"], "Output 2");
        assert!(json.get("previous").is_none());

        let conn = PanelEvent::ConnectionChanged {
            previous: ConnectionState::Authenticating,
            new: ConnectionState::Polling,
        };
        let json = serde_json::to_value(EventPayload::from_event(&conn, &labels).unwrap()).unwrap();
        assert_eq!(json["state"], "polling");
        assert_eq!(json["previous"], "authenticating");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_command_result_has_no_event_payload() {
        let command = Command::new(Target::System, Action::SyncClock, None).unwrap();
        let event = PanelEvent::CommandResult {
            origin: "mqtt".into(),
            command,
            outcome: CommandOutcome::Accepted,
        };
        assert!(EventPayload::from_event(&event, &Labels::default()).is_none());
        assert!(entity_path(&event).is_none());
    }

    #[test]
    fn test_entity_paths() {
        let event = PanelEvent::PartitionChanged {
            id: 2,
            previous: None,
            new: PartitionStatusFlags::READY,
        };
        assert_eq!(entity_path(&event).as_deref(), Some("partitions/2"));
        let event = PanelEvent::SystemChanged {
            previous: None,
            new: SystemStatusFlags::empty(),
        };
        assert_eq!(entity_path(&event).as_deref(), Some("system"));
    }

    #[test]
    fn test_command_request_parsing() {
        let req: CommandRequest =
            serde_json::from_str(r#"{"target":"partition","id":1,"action":"arm_stay","code":"1234"}"#)
                .unwrap();
        let cmd = req.into_command().unwrap();
        assert_eq!(cmd.target(), Target::Partition(1));
        assert_eq!(cmd.action(), Action::ArmStay);
        assert_eq!(cmd.code(), Some("1234"));

        let req: CommandRequest = serde_json::from_str(r#"{"target":"zone","action":"bypass"}"#).unwrap();
        assert!(req.into_command().is_err());
    }

    #[test]
    fn test_cmd_ack_hides_code() {
        let cmd = Command::new(Target::Partition(1), Action::Disarm, Some("1234".into())).unwrap();
        let ack = CmdAck::new(&cmd, &CommandOutcome::Rejected(PanelErrorCode::InvalidCode));
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["op"], "CMD_ACK");
        assert_eq!(json["success"], false);
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["src"]["target"], "partition");
        assert!(json["src"].get("code").is_none());
    }
}
