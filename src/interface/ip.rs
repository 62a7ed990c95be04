// MIT License - Copyright (c) 2026 Peter Wright
// Local TCP listener: newline-delimited JSON events and commands

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::payload::{CmdAck, CommandRequest, EventPayload};
use super::{CommandSink, Interface};
use crate::config::{IpListenerConfig, Labels};
use crate::error::{GatewayError, Result};
use crate::event::PanelEvent;

/// Lines buffered per client before a slow client starts missing events.
const CLIENT_BACKLOG: usize = 256;

/// Longest request line accepted; a client exceeding it is dropped.
pub const MAX_REQUEST_LEN: usize = 4096;

/// Streams events to every connected client, one JSON object per line.
///
/// Each line a client sends is parsed as a command request. Command results
/// are sent to all clients since they share one interface name.
pub struct IpInterface {
    name: String,
    listen: String,
    labels: Labels,
    lines: broadcast::Sender<Arc<str>>,
    local_addr: Mutex<Option<SocketAddr>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IpInterface {
    pub fn new(config: IpListenerConfig, labels: Labels) -> Self {
        let (lines, _) = broadcast::channel(CLIENT_BACKLOG);
        Self {
            name: "ip".into(),
            listen: config.listen,
            labels,
            lines,
            local_addr: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|a| *a)
    }

    pub fn client_count(&self) -> usize {
        self.lines.receiver_count()
    }

    fn broadcast(&self, payload: &impl Serialize) {
        match serde_json::to_string(payload) {
            // No receivers just means no clients are connected.
            Ok(json) => {
                let _ = self.lines.send(Arc::from(json));
            }
            Err(e) => error!("Failed to serialize event: {}", e),
        }
    }
}

#[async_trait]
impl Interface for IpInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, commands: CommandSink) -> Result<()> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .map_err(|e| GatewayError::InterfaceStartupFailure {
                name: self.name.clone(),
                reason: format!("cannot listen on {}: {}", self.listen, e),
            })?;
        let addr = listener.local_addr()?;
        info!("IP interface listening on {}", addr);

        let task = tokio::spawn(accept_loop(listener, self.lines.clone(), commands));
        if let Ok(mut slot) = self.local_addr.lock() {
            *slot = Some(addr);
        }
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    async fn receive_event(&self, event: &PanelEvent) -> Result<()> {
        match event {
            PanelEvent::CommandResult { command, outcome, .. } => {
                self.broadcast(&CmdAck::new(command, outcome));
            }
            _ => {
                if let Some(payload) = EventPayload::from_event(event, &self.labels) {
                    self.broadcast(&payload);
                }
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Dropping the accept loop's JoinSet aborts every client task.
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!("IP interface closed");
        }
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, lines: broadcast::Sender<Arc<str>>, commands: CommandSink) {
    let mut clients = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("IP client {} connected", peer);
                    clients.spawn(serve_client(stream, peer, lines.subscribe(), commands.clone()));
                }
                Err(e) => warn!("IP accept failed: {}", e),
            },
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    mut events: broadcast::Receiver<Arc<str>>,
    commands: CommandSink,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut pending = Vec::new();

    loop {
        tokio::select! {
            line = next_request(&mut reader, &mut pending) => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(reply) = handle_line(line, &commands).await {
                        if write_line(&mut write_half, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!("IP client {} dropped: {}", peer, e);
                    break;
                }
                Err(e) => {
                    debug!("IP client {} read error: {}", peer, e);
                    break;
                }
            },
            received = events.recv() => match received {
                Ok(json) => {
                    if write_line(&mut write_half, &json).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("IP client {} lagged, missed {} events", peer, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!("IP client {} disconnected", peer);
}

/// Next newline-terminated request, `None` at end of stream.
///
/// Partial input stays in `pending`, so a call cancelled by `select!` loses
/// nothing. A line longer than `MAX_REQUEST_LEN` is an `InvalidData` error.
async fn next_request<R>(reader: &mut R, pending: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let limit = (MAX_REQUEST_LEN + 1).saturating_sub(pending.len()) as u64;
    (&mut *reader).take(limit).read_until(b'\n', pending).await?;

    if pending.last() != Some(&b'\n') {
        if pending.len() > MAX_REQUEST_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("request line longer than {} bytes", MAX_REQUEST_LEN),
            ));
        }
        // End of stream; hand back a final unterminated line if there is one.
        if pending.is_empty() {
            return Ok(None);
        }
    }
    let line = String::from_utf8_lossy(pending).trim_end_matches(['\r', '\n']).to_string();
    pending.clear();
    Ok(Some(line))
}

/// Submit one request line. Returns a reply only when it was refused.
async fn handle_line(line: &str, commands: &CommandSink) -> Option<String> {
    let request = match serde_json::from_str::<CommandRequest>(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Failed to parse IP command: {}", e);
            return Some(serde_json::json!({ "op": "ERROR", "error": e.to_string() }).to_string());
        }
    };
    let src = CommandRequest {
        code: None,
        ..request.clone()
    };
    let result = match request.into_command() {
        Ok(command) => commands.submit(command).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => None,
        Err(e) => {
            warn!("IP command refused: {}", e);
            serde_json::to_string(&CmdAck::invalid(src, e.to_string())).ok()
        }
    }
}

async fn write_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}
