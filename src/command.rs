// MIT License - Copyright (c) 2026 Peter Wright
// Commands and the pending-command queue

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::constants::*;
use crate::error::{GatewayError, PanelErrorCode, Result};

/// Entity a command acts on. Ids are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Partition(u32),
    Zone(u32),
    Output(u32),
    System,
}

impl Target {
    /// Build a target from its kind name and id (`system` takes no id).
    pub fn from_parts(kind: &str, id: Option<u32>) -> Result<Self> {
        let need_id = |kind: &str| {
            id.ok_or_else(|| GatewayError::InvalidCommand {
                details: format!("{} target needs an id", kind),
            })
        };
        match kind {
            "partition" => Ok(Target::Partition(need_id(kind)?)),
            "zone" => Ok(Target::Zone(need_id(kind)?)),
            "output" => Ok(Target::Output(need_id(kind)?)),
            "system" => Ok(Target::System),
            other => Err(GatewayError::InvalidCommand {
                details: format!("unknown target kind '{}'", other),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Partition(_) => "partition",
            Target::Zone(_) => "zone",
            Target::Output(_) => "output",
            Target::System => "system",
        }
    }

    pub fn id(&self) -> Option<u32> {
        match self {
            Target::Partition(id) | Target::Zone(id) | Target::Output(id) => Some(*id),
            Target::System => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{} {}", self.kind(), id),
            None => f.write_str(self.kind()),
        }
    }
}

/// Requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Arm,
    ArmStay,
    ArmSleep,
    Disarm,
    Bypass,
    ClearBypass,
    On,
    Off,
    Pulse,
    SyncClock,
}

impl Action {
    /// Wire code carried in the first byte of a command frame.
    pub fn code(&self) -> u8 {
        match self {
            Action::Arm => ACTION_ARM,
            Action::ArmStay => ACTION_ARM_STAY,
            Action::ArmSleep => ACTION_ARM_SLEEP,
            Action::Disarm => ACTION_DISARM,
            Action::Bypass => ACTION_BYPASS,
            Action::ClearBypass => ACTION_CLEAR_BYPASS,
            Action::On => ACTION_OUTPUT_ON,
            Action::Off => ACTION_OUTPUT_OFF,
            Action::Pulse => ACTION_OUTPUT_PULSE,
            Action::SyncClock => ACTION_SYNC_CLOCK,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Arm => "arm",
            Action::ArmStay => "arm_stay",
            Action::ArmSleep => "arm_sleep",
            Action::Disarm => "disarm",
            Action::Bypass => "bypass",
            Action::ClearBypass => "clear_bypass",
            Action::On => "on",
            Action::Off => "off",
            Action::Pulse => "pulse",
            Action::SyncClock => "sync_clock",
        }
    }

    /// Whether this action makes sense for the given target.
    pub fn applies_to(&self, target: &Target) -> bool {
        matches!(
            (self, target),
            (Action::Arm | Action::ArmStay | Action::ArmSleep | Action::Disarm, Target::Partition(_))
                | (Action::Bypass | Action::ClearBypass, Target::Zone(_))
                | (Action::On | Action::Off | Action::Pulse, Target::Output(_))
                | (Action::SyncClock, Target::System)
        )
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "arm" | "arm_away" => Ok(Action::Arm),
            "arm_stay" | "stay" => Ok(Action::ArmStay),
            "arm_sleep" | "sleep" => Ok(Action::ArmSleep),
            "disarm" => Ok(Action::Disarm),
            "bypass" => Ok(Action::Bypass),
            "clear_bypass" | "unbypass" => Ok(Action::ClearBypass),
            "on" => Ok(Action::On),
            "off" => Ok(Action::Off),
            "pulse" => Ok(Action::Pulse),
            "sync_clock" => Ok(Action::SyncClock),
            other => Err(GatewayError::InvalidCommand {
                details: format!("unknown action '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request for the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    target: Target,
    action: Action,
    code: Option<String>,
}

impl Command {
    /// Validate and build a command.
    ///
    /// The action must suit the target, entity ids start at 1 and a user code,
    /// when given, is 4 to 6 digits.
    pub fn new(target: Target, action: Action, code: Option<String>) -> Result<Self> {
        if !action.applies_to(&target) {
            return Err(GatewayError::InvalidCommand {
                details: format!("cannot {} a {}", action, target.kind()),
            });
        }
        if target.id() == Some(0) {
            return Err(GatewayError::InvalidCommand {
                details: format!("{} ids start at 1", target.kind()),
            });
        }
        if let Some(code) = &code {
            let digits = code.chars().all(|c| c.is_ascii_digit());
            if !digits || !(4..=6).contains(&code.len()) {
                return Err(GatewayError::InvalidCommand {
                    details: "user code must be 4 to 6 digits".into(),
                });
            }
        }
        Ok(Self { target, action, code })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for Command {
    // User codes are never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.target)
    }
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    Rejected(PanelErrorCode),
    TimedOut,
    /// Dropped from a full queue to make room for a newer command.
    Evicted,
    /// The panel model cannot express it.
    Invalid(String),
    /// Never reached the panel.
    NotSent(String),
    /// Sent, but the link failed before the panel answered.
    LinkLost(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOutcome::Accepted => "accepted",
            CommandOutcome::Rejected(_) => "rejected",
            CommandOutcome::TimedOut => "timed_out",
            CommandOutcome::Evicted => "evicted",
            CommandOutcome::Invalid(_) => "invalid",
            CommandOutcome::NotSent(_) => "not_sent",
            CommandOutcome::LinkLost(_) => "link_lost",
        }
    }

    /// Extra detail for negative outcomes.
    pub fn reason(&self) -> Option<String> {
        match self {
            CommandOutcome::Rejected(code) => Some(code.to_string()),
            CommandOutcome::Invalid(r) | CommandOutcome::NotSent(r) | CommandOutcome::LinkLost(r) => {
                Some(r.clone())
            }
            CommandOutcome::TimedOut => Some("no acknowledgement from panel".into()),
            CommandOutcome::Evicted => Some("command queue full".into()),
            CommandOutcome::Accepted => None,
        }
    }
}

/// A command waiting for the engine, tagged with the interface that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    pub origin: String,
    pub command: Command,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<QueuedCommand>,
    closed: bool,
}

/// Bounded FIFO of commands awaiting the engine.
///
/// When full, the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a command. Returns the evicted entry if the queue was full.
    pub async fn push(&self, item: QueuedCommand) -> Result<Option<QueuedCommand>> {
        let evicted = {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(GatewayError::QueueClosed);
            }
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(item);
            evicted
        };
        if let Some(old) = &evicted {
            warn!("Command queue full, evicting '{}' from {}", old.command, old.origin);
        }
        self.notify.notify_one();
        Ok(evicted)
    }

    pub async fn pop(&self) -> Option<QueuedCommand> {
        self.inner.lock().await.items.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Refuse further pushes and hand back whatever was still pending.
    pub async fn close(&self) -> Vec<QueuedCommand> {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        let drained = inner.items.drain(..).collect();
        drop(inner);
        self.notify.notify_one();
        drained
    }

    /// Resolves after the next push (or close). A push made while nobody was
    /// waiting is remembered for the next call.
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}
