// MIT License - Copyright (c) 2026 Peter Wright
// IP module tunnel transport

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use super::Transport;
use crate::constants::*;
use crate::error::{GatewayError, Result};

/// Header of one tunnel packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PacketHeader {
    pub kind: u8,
    pub status: u8,
    pub len: usize,
}

/// Wrap `payload` in a tunnel packet.
pub(crate) fn encode_packet(kind: u8, status: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TUNNEL_HEADER_LEN + payload.len());
    buf.put_u8(TUNNEL_MAGIC);
    buf.put_u16_le(payload.len() as u16);
    buf.put_u8(kind);
    buf.put_u8(TUNNEL_FLAGS);
    buf.put_u8(status);
    buf.put_bytes(TUNNEL_PAD, TUNNEL_HEADER_LEN - 6);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split one complete packet off the front of `raw`, if present.
pub(crate) fn take_packet(raw: &mut BytesMut) -> Result<Option<(PacketHeader, Bytes)>> {
    if raw.len() < TUNNEL_HEADER_LEN {
        return Ok(None);
    }
    if raw[0] != TUNNEL_MAGIC {
        return Err(GatewayError::MalformedFrame {
            details: format!("tunnel packet starts with 0x{:02X}", raw[0]),
        });
    }
    let header = PacketHeader {
        len: u16::from_le_bytes([raw[1], raw[2]]) as usize,
        kind: raw[3],
        status: raw[5],
    };
    if raw.len() < TUNNEL_HEADER_LEN + header.len {
        return Ok(None);
    }
    raw.advance(TUNNEL_HEADER_LEN);
    let payload = raw.split_to(header.len).freeze();
    Ok(Some((header, payload)))
}

fn map_read_error(e: std::io::Error) -> GatewayError {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
            GatewayError::ConnectionReset
        }
        _ => GatewayError::Io(e),
    }
}

/// Link to the panel's IP module.
///
/// The module speaks a packet tunnel: a login exchange with the module
/// password, then panel bytes wrapped in passthrough packets.
pub struct IpTransport {
    host: String,
    port: u16,
    password: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    /// Tunnel bytes not yet unwrapped.
    raw: BytesMut,
    /// Panel bytes unwrapped but not yet handed out.
    inbound: BytesMut,
}

impl IpTransport {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            connect_timeout: Duration::from_secs(5),
            stream: None,
            raw: BytesMut::new(),
            inbound: BytesMut::new(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn unavailable(&self, reason: impl Into<String>) -> GatewayError {
        GatewayError::TransportUnavailable {
            target: self.addr(),
            reason: reason.into(),
        }
    }

    async fn read_packet(&mut self, deadline: Instant) -> Result<(PacketHeader, Bytes)> {
        loop {
            if let Some(packet) = take_packet(&mut self.raw)? {
                return Ok(packet);
            }
            let stream = self.stream.as_mut().ok_or(GatewayError::NotConnected)?;
            let n = timeout_at(deadline, stream.read_buf(&mut self.raw))
                .await
                .map_err(|_| GatewayError::IoTimeout)?
                .map_err(map_read_error)?;
            if n == 0 {
                return Err(GatewayError::ConnectionReset);
            }
        }
    }

    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(GatewayError::NotConnected)?;
        stream.write_all(packet).await.map_err(map_read_error)?;
        stream.flush().await.map_err(map_read_error)?;
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        let request = encode_packet(TUNNEL_LOGIN_REQUEST, TUNNEL_STATUS_OK, self.password.as_bytes());
        self.send_packet(&request).await?;

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            let (header, _) = match self.read_packet(deadline).await {
                Ok(packet) => packet,
                Err(GatewayError::IoTimeout) => {
                    return Err(GatewayError::AuthenticationFailed {
                        reason: "no login response from IP module".into(),
                    });
                }
                Err(e) => return Err(e),
            };
            if header.kind != TUNNEL_LOGIN_RESPONSE {
                debug!("Ignoring tunnel packet type 0x{:02X} during login", header.kind);
                continue;
            }
            if header.status == TUNNEL_STATUS_OK {
                return Ok(());
            }
            return Err(GatewayError::AuthenticationFailed {
                reason: format!("IP module rejected password (status 0x{:02X})", header.status),
            });
        }
    }
}

#[async_trait]
impl Transport for IpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self.addr();
        info!("Connecting to panel IP module at {}", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| self.unavailable("connect timed out"))?
            .map_err(|e| self.unavailable(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| self.unavailable(e.to_string()))?;

        self.stream = Some(stream);
        self.raw.clear();
        self.inbound.clear();

        if let Err(e) = self.login().await {
            warn!("IP module login failed: {}", e);
            self.stream = None;
            return Err(e);
        }
        info!("Logged in to IP module at {}", addr);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}", self.addr());
            let _ = stream.shutdown().await;
        }
        self.raw.clear();
        self.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        while self.inbound.is_empty() {
            let (header, payload) = self.read_packet(deadline).await?;
            if header.kind == TUNNEL_PASSTHROUGH {
                self.inbound.extend_from_slice(&payload);
            } else {
                debug!("Skipping tunnel packet type 0x{:02X}", header.kind);
            }
        }
        let n = max_bytes.clamp(1, self.inbound.len());
        Ok(self.inbound.split_to(n).freeze())
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let packet = encode_packet(TUNNEL_PASSTHROUGH, TUNNEL_STATUS_OK, data);
        self.send_packet(&packet).await?;
        Ok(data.len())
    }

    fn describe(&self) -> String {
        format!("ip {}", self.addr())
    }
}
