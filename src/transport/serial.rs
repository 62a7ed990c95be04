// MIT License - Copyright (c) 2026 Peter Wright
// RS-232 transport

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::Transport;
use crate::error::{GatewayError, Result};

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Serial link to the panel, 8-N-1 without flow control.
///
/// `serialport` is blocking, so every call runs on the blocking pool.
pub struct SerialTransport {
    device: String,
    baud: u32,
    port: Option<SharedPort>,
}

impl SerialTransport {
    pub fn new(device: impl Into<String>, baud: u32) -> Self {
        Self {
            device: device.into(),
            baud,
            port: None,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> GatewayError {
        GatewayError::TransportUnavailable {
            target: self.device.clone(),
            reason: reason.into(),
        }
    }

    async fn with_port<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SerialPort) -> Result<T> + Send + 'static,
    {
        let port = self.port.clone().ok_or(GatewayError::NotConnected)?;
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock().map_err(|_| GatewayError::TransportUnavailable {
                target: device,
                reason: "serial port lock poisoned".into(),
            })?;
            op(&mut **guard)
        })
        .await
        .map_err(|e| GatewayError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        info!("Opening serial port {} at {} baud", self.device, self.baud);
        let device = self.device.clone();
        let baud = self.baud;
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(&device, baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(100))
                .open()
        })
        .await
        .map_err(|e| self.unavailable(e.to_string()))?;

        let port = opened.map_err(|e| self.unavailable(e.to_string()))?;
        self.port = Some(Arc::new(Mutex::new(port)));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.device);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes> {
        self.with_port(move |port| {
            port.set_timeout(timeout)
                .map_err(|e| GatewayError::Io(std::io::Error::other(e)))?;
            let mut buf = vec![0u8; max_bytes.max(1)];
            match port.read(&mut buf) {
                Ok(0) => Err(GatewayError::IoTimeout),
                Ok(n) => {
                    buf.truncate(n);
                    Ok(Bytes::from(buf))
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => Err(GatewayError::IoTimeout),
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(GatewayError::ConnectionReset),
                Err(e) => Err(GatewayError::Io(e)),
            }
        })
        .await
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let data = data.to_vec();
        self.with_port(move |port| {
            port.write_all(&data)?;
            port.flush()?;
            Ok(data.len())
        })
        .await
    }

    fn describe(&self) -> String {
        format!("serial {} @ {}", self.device, self.baud)
    }
}
