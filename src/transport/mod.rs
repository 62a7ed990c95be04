// MIT License - Copyright (c) 2026 Peter Wright
// Byte-stream transports to the panel

pub mod ip;
pub mod serial;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::model::PanelModel;

pub use ip::IpTransport;
pub use serial::SerialTransport;

/// A raw byte pipe to the panel. Knows nothing about frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link. For IP this includes the password handshake.
    async fn connect(&mut self) -> Result<()>;

    /// Close the link. Safe to call when already closed.
    async fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Read up to `max_bytes`, waiting at most `timeout`.
    ///
    /// Never returns an empty buffer: no data is `IoTimeout`, a closed peer is
    /// `ConnectionReset`.
    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes>;

    /// Write all of `data`, returning the number of bytes written.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Human-readable endpoint for logs.
    fn describe(&self) -> String;
}

/// Build the transport selected by configuration.
pub fn from_config(config: &ConnectionConfig, model: PanelModel) -> Box<dyn Transport> {
    match config {
        ConnectionConfig::Serial { device, baud } => Box::new(SerialTransport::new(
            device.clone(),
            baud.unwrap_or(model.layout().baud),
        )),
        ConnectionConfig::Ip {
            host,
            port,
            password,
            connect_timeout_ms,
        } => Box::new(
            IpTransport::new(host.clone(), *port, password.clone())
                .with_connect_timeout(Duration::from_millis(*connect_timeout_ms)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_uses_model_baud_by_default() {
        let config = ConnectionConfig::Serial {
            device: "/dev/ttyUSB0".into(),
            baud: None,
        };
        let transport = from_config(&config, PanelModel::Evo192);
        assert_eq!(transport.describe(), "serial /dev/ttyUSB0 @ 38400");
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_ip_describe() {
        let config = ConnectionConfig::Ip {
            host: "10.0.0.5".into(),
            port: 10000,
            password: "paradox".into(),
            connect_timeout_ms: 5000,
        };
        assert_eq!(from_config(&config, PanelModel::Spectra).describe(), "ip 10.0.0.5:10000");
    }
}
