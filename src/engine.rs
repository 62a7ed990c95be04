// MIT License - Copyright (c) 2026 Peter Wright
// Protocol engine: login, polling and command delivery for one panel session

use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandOutcome, CommandQueue, QueuedCommand};
use crate::config::EngineSettings;
use crate::error::{GatewayError, Result};
use crate::event::PanelEvent;
use crate::frame::{Frame, FrameReader};
use crate::interface::InterfaceManager;
use crate::protocol::{Decoded, PanelProtocol, ParadoxProtocol};
use crate::state::{ConnectionState, PanelState, StatusUpdate};
use crate::transport::Transport;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 256;

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Shutdown was requested.
    Shutdown,
    Failed {
        error: GatewayError,
        /// Whether the session got as far as polling.
        reached_polling: bool,
    },
}

/// Single owner and writer of the panel state.
///
/// One `run_session` call drives one transport connection from Connecting to
/// Failed (or shutdown). Reconnecting is the supervisor's job.
pub struct Engine {
    settings: EngineSettings,
    protocol: Box<dyn PanelProtocol>,
    manager: InterfaceManager,
    queue: Arc<CommandQueue>,
    state: PanelState,
    reader: FrameReader,
    consecutive_timeouts: u32,
    checksum_drops: u64,
    reached_polling: bool,
}

impl Engine {
    pub fn new(settings: EngineSettings, manager: InterfaceManager) -> Result<Self> {
        let protocol = ParadoxProtocol::new(settings.model, &settings.pc_password)?;
        Ok(Self::with_protocol(settings, Box::new(protocol), manager))
    }

    pub fn with_protocol(
        settings: EngineSettings,
        protocol: Box<dyn PanelProtocol>,
        manager: InterfaceManager,
    ) -> Self {
        let queue = manager.command_queue();
        Self {
            settings,
            protocol,
            manager,
            queue,
            state: PanelState::default(),
            reader: FrameReader::new(),
            consecutive_timeouts: 0,
            checksum_drops: 0,
            reached_polling: false,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection
    }

    /// Frames dropped for a bad checksum since the engine was created.
    pub fn checksum_drops(&self) -> u64 {
        self.checksum_drops
    }

    /// Run one session until it fails or shutdown is requested.
    ///
    /// Leaves the engine in `Failed` on error; the caller disconnects the
    /// transport and then calls [`Engine::mark_disconnected`].
    pub async fn run_session(
        &mut self,
        transport: &mut dyn Transport,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        self.reached_polling = false;
        match self.session(transport, shutdown).await {
            Ok(()) => SessionEnd::Shutdown,
            Err(error) => {
                warn!("Panel session failed: {}", error);
                self.set_connection(ConnectionState::Failed).await;
                SessionEnd::Failed {
                    error,
                    reached_polling: self.reached_polling,
                }
            }
        }
    }

    pub async fn mark_disconnected(&mut self) {
        self.set_connection(ConnectionState::Disconnected).await;
    }

    async fn session(
        &mut self,
        transport: &mut dyn Transport,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        self.reader.clear();
        self.consecutive_timeouts = 0;

        self.set_connection(ConnectionState::Connecting).await;
        transport.connect().await?;

        self.set_connection(ConnectionState::Authenticating).await;
        self.login(transport).await?;

        self.set_connection(ConnectionState::Polling).await;
        self.reached_polling = true;

        let queue = self.queue.clone();
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            self.poll_cycle(transport).await?;
            self.drain_commands(transport, shutdown).await?;

            let next_poll = Instant::now() + self.settings.poll_interval;
            loop {
                tokio::select! {
                    _ = sleep_until(next_poll) => break,
                    _ = queue.notified() => self.drain_commands(transport, shutdown).await?,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutdown requested, leaving polling");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn login(&mut self, transport: &mut dyn Transport) -> Result<()> {
        let frame = self.protocol.login_frame()?;
        self.send(transport, &frame).await?;

        let deadline = Instant::now() + self.settings.login_timeout;
        loop {
            let frame = match self.next_frame(transport, deadline).await {
                Err(GatewayError::IoTimeout) => {
                    return Err(GatewayError::AuthenticationFailed {
                        reason: "no login acknowledgement from panel".into(),
                    });
                }
                other => other?,
            };
            match self.protocol.decode(&frame) {
                Ok(Decoded::LoginAck { accepted: true, .. }) => {
                    info!("Logged in to {} panel", self.protocol.layout().name);
                    return Ok(());
                }
                Ok(Decoded::LoginAck { status, .. }) => {
                    return Err(GatewayError::AuthenticationFailed {
                        reason: format!("panel refused login (status 0x{:02X})", status),
                    });
                }
                Ok(other) => debug!("Ignoring {:?} while logging in", other),
                Err(e) => warn!("Dropping frame while logging in: {}", e),
            }
        }
    }

    /// Request every status block once, applying whatever arrives meanwhile.
    async fn poll_cycle(&mut self, transport: &mut dyn Transport) -> Result<()> {
        for request in self.protocol.status_requests()? {
            self.send(transport, &request.frame).await?;
            let deadline = Instant::now() + self.settings.read_timeout;
            loop {
                let frame = match self.next_frame(transport, deadline).await {
                    Ok(frame) => frame,
                    Err(GatewayError::IoTimeout) => {
                        self.consecutive_timeouts += 1;
                        warn!(
                            "No answer for status block {} ({}/{} timeouts)",
                            request.block,
                            self.consecutive_timeouts,
                            self.settings.max_consecutive_timeouts
                        );
                        if self.consecutive_timeouts >= self.settings.max_consecutive_timeouts {
                            return Err(GatewayError::IoTimeout);
                        }
                        break;
                    }
                    Err(e) => return Err(e),
                };
                if let Some(Decoded::StatusResponse { block, .. }) = self.handle_frame(&frame).await {
                    if block == request.block {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn drain_commands(
        &mut self,
        transport: &mut dyn Transport,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<()> {
        while let Some(queued) = self.queue.pop().await {
            self.execute(transport, queued).await?;
            if *shutdown.borrow() {
                break;
            }
        }
        Ok(())
    }

    /// Send one command and wait for its acknowledgement.
    ///
    /// Only a transport failure is an error; every other ending is reported to
    /// the origin as a command result.
    async fn execute(&mut self, transport: &mut dyn Transport, queued: QueuedCommand) -> Result<()> {
        let QueuedCommand { origin, command } = queued;
        let frame = match self.protocol.encode_command(&command, Local::now().naive_local()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Cannot send '{}' from {}: {}", command, origin, e);
                self.publish_result(origin, command, CommandOutcome::Invalid(e.to_string()))
                    .await;
                return Ok(());
            }
        };

        info!("Sending '{}' from {}", command, origin);
        if let Err(e) = self.send(transport, &frame).await {
            self.publish_result(origin, command, CommandOutcome::NotSent(e.to_string()))
                .await;
            return Err(e);
        }

        let deadline = Instant::now() + self.settings.command_timeout;
        let outcome = loop {
            let frame = match self.next_frame(transport, deadline).await {
                Ok(frame) => frame,
                Err(GatewayError::IoTimeout) => break CommandOutcome::TimedOut,
                Err(e) => {
                    self.publish_result(origin, command, CommandOutcome::LinkLost(e.to_string()))
                        .await;
                    return Err(e);
                }
            };
            match self.handle_frame(&frame).await {
                Some(Decoded::CommandAck { action, target })
                    if self.protocol.acknowledges(action, target, &command) =>
                {
                    break CommandOutcome::Accepted;
                }
                Some(Decoded::CommandNack(code)) => break CommandOutcome::Rejected(code),
                _ => {}
            }
        };

        match &outcome {
            CommandOutcome::Accepted => info!("'{}' accepted", command),
            CommandOutcome::Rejected(code) => {
                warn!("{}", GatewayError::CommandRejected(*code));
            }
            _ => warn!(
                "{}",
                GatewayError::CommandTimeout {
                    command: command.to_string()
                }
            ),
        }
        self.publish_result(origin, command, outcome).await;
        Ok(())
    }

    /// Decode a frame, applying any state it carries.
    async fn handle_frame(&mut self, frame: &Frame) -> Option<Decoded> {
        let decoded = match self.protocol.decode(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Dropping frame 0x{:02X}: {}", frame.code(), e);
                return None;
            }
        };
        match &decoded {
            Decoded::StatusResponse { update, .. } | Decoded::LiveEvent(update) => {
                self.apply(update).await;
            }
            Decoded::Unknown { code } => debug!("Ignoring frame with code 0x{:02X}", code),
            _ => {}
        }
        Some(decoded)
    }

    async fn apply(&mut self, update: &StatusUpdate) {
        let events = self.state.apply(update);
        if !events.is_empty() {
            debug!("Status update produced {} events", events.len());
            self.manager.publish_state(&self.state, events).await;
        }
    }

    /// Next checksum-valid frame, or `IoTimeout` at `deadline`.
    async fn next_frame(&mut self, transport: &mut dyn Transport, deadline: Instant) -> Result<Frame> {
        loop {
            match self.reader.next_frame() {
                Some(Ok(frame)) => {
                    self.consecutive_timeouts = 0;
                    return Ok(frame);
                }
                Some(Err(e @ GatewayError::FrameChecksumMismatch { .. })) => {
                    self.checksum_drops += 1;
                    warn!("Dropped frame: {} ({} so far)", e, self.checksum_drops);
                    continue;
                }
                Some(Err(e)) => {
                    warn!("Dropped frame: {}", e);
                    continue;
                }
                None => {}
            }

            let now = Instant::now();
            if now >= deadline {
                self.reader.clear();
                return Err(GatewayError::IoTimeout);
            }
            match transport.read(READ_CHUNK, deadline - now).await {
                Ok(bytes) => {
                    debug!("RX {:02X?}", &bytes[..]);
                    self.reader.push(&bytes);
                }
                Err(GatewayError::IoTimeout) => {
                    // Whatever partial frame we had is stale now.
                    self.reader.clear();
                    return Err(GatewayError::IoTimeout);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&mut self, transport: &mut dyn Transport, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        debug!("TX {:02X?}", &bytes[..]);
        let written = transport.write(&bytes).await?;
        if written != bytes.len() {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, bytes.len()),
            )));
        }
        Ok(())
    }

    async fn set_connection(&mut self, new: ConnectionState) {
        let previous = self.state.connection;
        if previous == new {
            return;
        }
        self.state.connection = new;
        self.state.fresh = new == ConnectionState::Polling;
        info!("Panel connection {} -> {}", previous, new);
        self.manager
            .publish_state(&self.state, vec![PanelEvent::ConnectionChanged { previous, new }])
            .await;
    }

    async fn publish_result(&self, origin: String, command: Command, outcome: CommandOutcome) {
        self.manager
            .publish(PanelEvent::CommandResult {
                origin,
                command,
                outcome,
            })
            .await;
    }
}
