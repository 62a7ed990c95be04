// MIT License - Copyright (c) 2026 Peter Wright
// Gateway error taxonomy

use std::fmt;

/// Negative-acknowledgement codes returned by the panel in response to commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelErrorCode {
    /// 0x01 - User or PC code refused
    InvalidCode,
    /// 0x02 - Partition not ready to arm
    NotReady,
    /// 0x03 - Target already in the requested state
    AlreadyInState,
    /// 0x04 - Target does not exist on this panel
    InvalidTarget,
    /// 0x05 - Panel busy (programming, another session)
    Busy,
    /// Any other code
    Unknown(u8),
}

impl PanelErrorCode {
    /// Parse the error byte carried in a NACK frame.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::InvalidCode,
            0x02 => Self::NotReady,
            0x03 => Self::AlreadyInState,
            0x04 => Self::InvalidTarget,
            0x05 => Self::Busy,
            other => Self::Unknown(other),
        }
    }

    /// The wire byte for this code.
    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidCode => 0x01,
            Self::NotReady => 0x02,
            Self::AlreadyInState => 0x03,
            Self::InvalidTarget => 0x04,
            Self::Busy => 0x05,
            Self::Unknown(c) => *c,
        }
    }

    /// Human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidCode => "Invalid code",
            Self::NotReady => "Not ready",
            Self::AlreadyInState => "Already in requested state",
            Self::InvalidTarget => "Invalid target",
            Self::Busy => "Panel busy",
            Self::Unknown(_) => "Unknown error",
        }
    }
}

impl fmt::Display for PanelErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}: {}", self.code(), self.description())
    }
}

/// All errors that can occur in the gateway library.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport unavailable ({target}): {reason}")]
    TransportUnavailable { target: String, reason: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("I/O timeout")]
    IoTimeout,

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Transport not connected")]
    NotConnected,

    #[error("Frame checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    FrameChecksumMismatch { expected: u8, actual: u8 },

    #[error("Malformed frame: {details}")]
    MalformedFrame { details: String },

    #[error("Command timeout: {command}")]
    CommandTimeout { command: String },

    #[error("Command rejected by panel: {0}")]
    CommandRejected(PanelErrorCode),

    #[error("Invalid command: {details}")]
    InvalidCommand { details: String },

    #[error("Invalid {kind} ID: {id} (max: {max})")]
    InvalidEntityId { kind: &'static str, id: u32, max: u32 },

    #[error("Interface {name} failed to start: {reason}")]
    InterfaceStartupFailure { name: String, reason: String },

    #[error("Interface already registered: {name}")]
    DuplicateInterface { name: String },

    #[error("Command queue closed")]
    QueueClosed,

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Gave up connecting after {attempts} attempts")]
    ConnectAttemptsExhausted { attempts: u32 },
}

impl GatewayError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Io(_)
                | GatewayError::TransportUnavailable { .. }
                | GatewayError::AuthenticationFailed { .. }
                | GatewayError::IoTimeout
                | GatewayError::ConnectionReset
                | GatewayError::NotConnected
                | GatewayError::FrameChecksumMismatch { .. }
                | GatewayError::MalformedFrame { .. }
                | GatewayError::ChannelClosed
        )
    }

    pub(crate) fn config(details: impl Into<String>) -> Self {
        GatewayError::Config {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_error_code_roundtrip() {
        for code in 0u8..=0x10 {
            assert_eq!(PanelErrorCode::from_code(code).code(), code);
        }
        assert_eq!(PanelErrorCode::from_code(0x02), PanelErrorCode::NotReady);
        assert_eq!(PanelErrorCode::from_code(0x42), PanelErrorCode::Unknown(0x42));
    }

    #[test]
    fn test_panel_error_code_display() {
        assert_eq!(PanelErrorCode::Busy.to_string(), "0x05: Panel busy");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::IoTimeout.is_retryable());
        assert!(GatewayError::ConnectionReset.is_retryable());
        assert!(
            GatewayError::AuthenticationFailed {
                reason: "rejected".into()
            }
            .is_retryable()
        );
        assert!(!GatewayError::config("bad").is_retryable());
        assert!(!GatewayError::QueueClosed.is_retryable());
    }
}
