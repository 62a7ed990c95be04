// MIT License - Copyright (c) 2026 Peter Wright
// Panel protocol: login, status polling and command encoding

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::command::{Action, Command, Target};
use crate::constants::*;
use crate::devices::zone::ZONE_BITMAP_ORDER;
use crate::devices::{OutputStatus, PartitionStatusFlags, SystemStatusFlags, ZoneStatusFlags};
use crate::error::{GatewayError, PanelErrorCode, Result};
use crate::frame::Frame;
use crate::model::{ModelLayout, PanelModel};
use crate::state::{PanelState, StatusUpdate};

/// A decoded panel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    LoginAck { accepted: bool, status: u8 },
    /// Answer to a status request for `block`.
    StatusResponse { block: u8, update: StatusUpdate },
    /// Unsolicited change pushed by the panel.
    LiveEvent(StatusUpdate),
    CommandAck { action: u8, target: u8 },
    CommandNack(PanelErrorCode),
    /// Valid frame with a code this model does not use.
    Unknown { code: u8 },
}

/// One status request sent every polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub block: u8,
    pub frame: Frame,
}

/// Model-specific wire knowledge used by the engine.
pub trait PanelProtocol: Send + Sync {
    fn layout(&self) -> &ModelLayout;

    /// Frame that opens a session.
    fn login_frame(&self) -> Result<Frame>;

    /// Requests that together refresh the whole panel state.
    fn status_requests(&self) -> Result<Vec<StatusRequest>>;

    /// Interpret a checksum-valid frame.
    fn decode(&self, frame: &Frame) -> Result<Decoded>;

    /// Build the frame for a command. `now` is used by clock sync.
    fn encode_command(&self, command: &Command, now: NaiveDateTime) -> Result<Frame>;

    /// Whether an acknowledgement refers to this command.
    fn acknowledges(&self, action: u8, target: u8, command: &Command) -> bool {
        action == command.action().code() && target == target_byte(&command.target())
    }
}

/// Wire byte identifying a command target.
pub fn target_byte(target: &Target) -> u8 {
    target.id().map(|id| id as u8).unwrap_or(0)
}

/// Pack a four hex digit PC password into two bytes.
pub fn pack_pc_password(password: &str) -> Result<[u8; 2]> {
    if password.len() != 4 || !password.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GatewayError::config("pc_password must be exactly 4 hex digits"));
    }
    let value = u16::from_str_radix(password, 16)
        .map_err(|e| GatewayError::config(format!("pc_password: {}", e)))?;
    Ok(value.to_be_bytes())
}

fn malformed(details: impl Into<String>) -> GatewayError {
    GatewayError::MalformedFrame {
        details: details.into(),
    }
}

fn bit(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

/// Table-driven implementation covering every supported Paradox model.
#[derive(Debug, Clone)]
pub struct ParadoxProtocol {
    layout: &'static ModelLayout,
    password: [u8; 2],
}

impl ParadoxProtocol {
    pub fn new(model: PanelModel, pc_password: &str) -> Result<Self> {
        Ok(Self {
            layout: model.layout(),
            password: pack_pc_password(pc_password)?,
        })
    }

    fn expected_len(&self, block: u8) -> Option<usize> {
        let l = self.layout;
        match block {
            BLOCK_SYSTEM => Some(1 + 2 + 2 * l.partitions as usize),
            BLOCK_ZONES => Some(1 + ZONE_BITMAP_ORDER.len() * l.zone_bitmap_len()),
            BLOCK_OUTPUTS => Some(1 + 2 * l.output_bitmap_len()),
            _ => None,
        }
    }

    fn decode_status(&self, payload: &[u8]) -> Result<Decoded> {
        let block = *payload.first().ok_or_else(|| malformed("empty status response"))?;
        let expected = self
            .expected_len(block)
            .ok_or_else(|| malformed(format!("unknown status block {}", block)))?;
        if payload.len() != expected {
            return Err(malformed(format!(
                "status block {} is {} bytes, expected {}",
                block,
                payload.len(),
                expected
            )));
        }
        let data = &payload[1..];
        let mut update = StatusUpdate::default();
        match block {
            BLOCK_SYSTEM => {
                update.system = Some(SystemStatusFlags::from_le_bytes([data[0], data[1]]));
                update.partitions = data[2..]
                    .chunks_exact(2)
                    .enumerate()
                    .map(|(i, b)| (i as u32 + 1, PartitionStatusFlags::from_le_bytes([b[0], b[1]])))
                    .collect();
            }
            BLOCK_ZONES => {
                let width = self.layout.zone_bitmap_len();
                let bitmaps: Vec<&[u8]> = data.chunks_exact(width).collect();
                update.zones = (0..self.layout.zones as usize)
                    .map(|i| {
                        let flags = ZONE_BITMAP_ORDER
                            .iter()
                            .zip(&bitmaps)
                            .filter(|(_, map)| bit(map, i))
                            .fold(ZoneStatusFlags::empty(), |acc, (flag, _)| acc | *flag);
                        (i as u32 + 1, flags)
                    })
                    .collect();
            }
            _ => {
                let width = self.layout.output_bitmap_len();
                let (on, pulsed) = data.split_at(width);
                update.outputs = (0..self.layout.outputs as usize)
                    .map(|i| (i as u32 + 1, OutputStatus::from_bits(bit(on, i), bit(pulsed, i))))
                    .collect();
            }
        }
        Ok(Decoded::StatusResponse { block, update })
    }

    fn decode_live(&self, payload: &[u8]) -> Result<Decoded> {
        if payload.len() < 3 {
            return Err(malformed("live event too short"));
        }
        let (kind, id) = (payload[0], payload[1] as u32);
        let mut update = StatusUpdate::default();
        let in_range = |max: u32| id >= 1 && id <= max;
        match (kind, payload.len()) {
            (LIVE_ZONE, 3) if in_range(self.layout.zones) => {
                update.zones.push((id, ZoneStatusFlags::from_byte(payload[2])));
            }
            (LIVE_PARTITION, 4) if in_range(self.layout.partitions) => {
                let flags = PartitionStatusFlags::from_le_bytes([payload[2], payload[3]]);
                update.partitions.push((id, flags));
            }
            (LIVE_OUTPUT, 3) if in_range(self.layout.outputs) => {
                let status = OutputStatus::from_byte(payload[2])
                    .ok_or_else(|| malformed(format!("bad output state {}", payload[2])))?;
                update.outputs.push((id, status));
            }
            _ => {
                return Err(malformed(format!(
                    "live event kind {} id {} ({} bytes)",
                    kind,
                    id,
                    payload.len()
                )));
            }
        }
        Ok(Decoded::LiveEvent(update))
    }

    fn check_target(&self, target: &Target) -> Result<()> {
        let (kind, max) = match target {
            Target::Partition(_) => ("partition", self.layout.partitions),
            Target::Zone(_) => ("zone", self.layout.zones),
            Target::Output(_) => ("output", self.layout.outputs),
            Target::System => return Ok(()),
        };
        match target.id() {
            Some(id) if id >= 1 && id <= max => Ok(()),
            Some(id) => Err(GatewayError::InvalidEntityId { kind, id, max }),
            None => Ok(()),
        }
    }

    // Panel-side encoders: what the panel sends back. Used by simulators and tests.

    pub fn login_ack_frame(&self, accepted: bool) -> Result<Frame> {
        let status = if accepted { LOGIN_ACCEPTED } else { 0x01 };
        Frame::new(self.layout.codes.login_ack, vec![status])
    }

    pub fn command_ack_frame(&self, action: u8, target: u8) -> Result<Frame> {
        Frame::new(self.layout.codes.command_ack, vec![action, target])
    }

    pub fn nack_frame(&self, code: PanelErrorCode) -> Result<Frame> {
        Frame::new(self.layout.codes.nack, vec![code.code()])
    }

    /// Encode `state` as the panel's answer for `block`. Missing entities read as idle.
    pub fn status_response_frame(&self, block: u8, state: &PanelState) -> Result<Frame> {
        let l = self.layout;
        let mut buf = BytesMut::new();
        buf.put_u8(block);
        match block {
            BLOCK_SYSTEM => {
                buf.put_u16_le(state.system.unwrap_or_default().bits());
                for id in 1..=l.partitions {
                    buf.put_u16_le(state.partition(id).unwrap_or_default().bits());
                }
            }
            BLOCK_ZONES => {
                let width = l.zone_bitmap_len();
                for flag in ZONE_BITMAP_ORDER {
                    let mut map = vec![0u8; width];
                    for (&id, status) in state.zones.range(1..=l.zones) {
                        if status.contains(flag) {
                            set_bit(&mut map, id as usize - 1);
                        }
                    }
                    buf.put_slice(&map);
                }
            }
            BLOCK_OUTPUTS => {
                let width = l.output_bitmap_len();
                let mut on = vec![0u8; width];
                let mut pulsed = vec![0u8; width];
                for (&id, status) in state.outputs.range(1..=l.outputs) {
                    match status {
                        OutputStatus::On => set_bit(&mut on, id as usize - 1),
                        OutputStatus::Pulsed => set_bit(&mut pulsed, id as usize - 1),
                        OutputStatus::Off => {}
                    }
                }
                buf.put_slice(&on);
                buf.put_slice(&pulsed);
            }
            other => return Err(malformed(format!("unknown status block {}", other))),
        }
        Frame::new(l.codes.status_response, buf.freeze())
    }

    pub fn live_zone_frame(&self, id: u32, flags: ZoneStatusFlags) -> Result<Frame> {
        Frame::new(self.layout.codes.live_event, vec![LIVE_ZONE, id as u8, flags.bits()])
    }
}

impl PanelProtocol for ParadoxProtocol {
    fn layout(&self) -> &ModelLayout {
        self.layout
    }

    fn login_frame(&self) -> Result<Frame> {
        Frame::new(self.layout.codes.login, self.password.to_vec())
    }

    fn status_requests(&self) -> Result<Vec<StatusRequest>> {
        [BLOCK_SYSTEM, BLOCK_ZONES, BLOCK_OUTPUTS]
            .into_iter()
            .map(|block| {
                Ok(StatusRequest {
                    block,
                    frame: Frame::new(self.layout.codes.status_request, vec![block])?,
                })
            })
            .collect()
    }

    fn decode(&self, frame: &Frame) -> Result<Decoded> {
        let codes = &self.layout.codes;
        let payload = frame.payload();
        let code = frame.code();
        if code == codes.login_ack {
            let status = *payload.first().ok_or_else(|| malformed("empty login ack"))?;
            Ok(Decoded::LoginAck {
                accepted: status == LOGIN_ACCEPTED,
                status,
            })
        } else if code == codes.status_response {
            self.decode_status(payload)
        } else if code == codes.live_event {
            self.decode_live(payload)
        } else if code == codes.command_ack {
            match payload {
                [action, target] => Ok(Decoded::CommandAck {
                    action: *action,
                    target: *target,
                }),
                _ => Err(malformed("command ack must be 2 bytes")),
            }
        } else if code == codes.nack {
            let err = *payload.first().ok_or_else(|| malformed("empty nack"))?;
            Ok(Decoded::CommandNack(PanelErrorCode::from_code(err)))
        } else {
            Ok(Decoded::Unknown { code })
        }
    }

    fn encode_command(&self, command: &Command, now: NaiveDateTime) -> Result<Frame> {
        self.check_target(&command.target())?;
        let mut buf = BytesMut::new();
        buf.put_u8(command.action().code());
        buf.put_u8(target_byte(&command.target()));
        if command.action() == Action::SyncClock {
            buf.put_u8(0);
            buf.put_u8((now.year().clamp(2000, 2255) - 2000) as u8);
            buf.put_u8(now.month() as u8);
            buf.put_u8(now.day() as u8);
            buf.put_u8(now.hour() as u8);
            buf.put_u8(now.minute() as u8);
        } else {
            let code = command.code().unwrap_or_default();
            buf.put_u8(code.len() as u8);
            buf.put_slice(code.as_bytes());
        }
        Frame::new(self.layout.codes.command, buf.freeze())
    }
}
