// MIT License - Copyright (c) 2026 Peter Wright
// Wire constants

/// Smallest possible frame: code + length + checksum.
pub const MIN_FRAME_LEN: usize = 3;
/// Largest frame the one-byte length field can describe.
pub const MAX_FRAME_LEN: usize = 255;
/// Largest payload that fits in a frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

/// Status blocks requested every polling cycle.
pub const BLOCK_SYSTEM: u8 = 0x00;
pub const BLOCK_ZONES: u8 = 0x01;
pub const BLOCK_OUTPUTS: u8 = 0x02;

/// Live event kinds (first payload byte of a live event frame).
pub const LIVE_ZONE: u8 = 0x00;
pub const LIVE_PARTITION: u8 = 0x01;
pub const LIVE_OUTPUT: u8 = 0x02;

/// Login acknowledgement status byte meaning "accepted".
pub const LOGIN_ACCEPTED: u8 = 0x00;

/// Command action codes (first payload byte of a command frame).
pub const ACTION_ARM: u8 = 0x01;
pub const ACTION_ARM_STAY: u8 = 0x02;
pub const ACTION_ARM_SLEEP: u8 = 0x03;
pub const ACTION_DISARM: u8 = 0x04;
pub const ACTION_BYPASS: u8 = 0x10;
pub const ACTION_CLEAR_BYPASS: u8 = 0x11;
pub const ACTION_OUTPUT_ON: u8 = 0x20;
pub const ACTION_OUTPUT_OFF: u8 = 0x21;
pub const ACTION_OUTPUT_PULSE: u8 = 0x22;
pub const ACTION_SYNC_CLOCK: u8 = 0x30;

/// IP tunnel framing.
pub const TUNNEL_MAGIC: u8 = 0xAA;
pub const TUNNEL_HEADER_LEN: usize = 16;
pub const TUNNEL_PAD: u8 = 0xEE;
pub const TUNNEL_LOGIN_RESPONSE: u8 = 0x01;
pub const TUNNEL_LOGIN_REQUEST: u8 = 0x03;
pub const TUNNEL_PASSTHROUGH: u8 = 0x04;
pub const TUNNEL_KEEPALIVE: u8 = 0x05;
pub const TUNNEL_FLAGS: u8 = 0x09;
pub const TUNNEL_STATUS_OK: u8 = 0x00;

/// Default TCP port of the panel's IP module.
pub const DEFAULT_IP_PORT: u16 = 10000;
