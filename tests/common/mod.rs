// Shared fixtures for the integration tests: a scripted panel behind the
// Transport trait, and an Interface that records what it receives.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use paradox_gateway::config::EngineSettings;
use paradox_gateway::error::{GatewayError, PanelErrorCode, Result};
use paradox_gateway::frame::{Frame, FrameReader};
use paradox_gateway::interface::{CommandSink, Interface};
use paradox_gateway::model::PanelModel;
use paradox_gateway::protocol::{PanelProtocol, ParadoxProtocol};
use paradox_gateway::state::{ConnectionState, PanelState};
use paradox_gateway::transport::Transport;
use paradox_gateway::PanelEvent;

pub const PC_PASSWORD: &str = "1234";

/// Engine settings with short timeouts; tests run on a paused clock anyway.
pub fn settings() -> EngineSettings {
    EngineSettings::builder()
        .model(PanelModel::Spectra)
        .pc_password(PC_PASSWORD)
        .poll_interval(Duration::from_millis(100))
        .read_timeout(Duration::from_millis(200))
        .login_timeout(Duration::from_millis(500))
        .command_timeout(Duration::from_millis(300))
        .max_consecutive_timeouts(5)
        .command_queue_depth(16)
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scripted panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    Ack,
    Nack(PanelErrorCode),
    Silent,
}

/// What the simulated panel knows and how it misbehaves.
pub struct PanelSim {
    pub protocol: ParadoxProtocol,
    /// State reported in status responses.
    pub panel: PanelState,
    pub reject_login: bool,
    /// Ignore status requests after login.
    pub silent: bool,
    /// Corrupt the checksum of this many upcoming status responses.
    pub corrupt_next: u32,
    pub command_reply: CommandReply,
    /// Drop the link as soon as a command frame arrives.
    pub drop_on_command: bool,
    /// Fail this many upcoming connect attempts.
    pub fail_connects: u32,
    pub connect_attempts: u32,
    pub logins: u32,
    pub status_requests: u32,
    /// Payloads of command frames received, in order.
    pub commands: Vec<Vec<u8>>,
    connected: bool,
    outbound: VecDeque<u8>,
}

impl PanelSim {
    fn queue_frame(&mut self, frame: &Frame) {
        self.outbound.extend(frame.encode().iter());
    }

    fn handle(&mut self, frame: Frame) {
        let codes = self.protocol.layout().codes;
        let code = frame.code();
        if code == codes.login {
            self.logins += 1;
            let ack = self.protocol.login_ack_frame(!self.reject_login).unwrap();
            self.queue_frame(&ack);
        } else if code == codes.status_request {
            self.status_requests += 1;
            if self.silent {
                return;
            }
            let block = frame.payload()[0];
            let reply = self.protocol.status_response_frame(block, &self.panel).unwrap();
            if self.corrupt_next > 0 {
                self.corrupt_next -= 1;
                let mut bytes = reply.encode().to_vec();
                let last = bytes.len() - 1;
                bytes[last] = bytes[last].wrapping_add(1);
                self.outbound.extend(bytes);
            } else {
                self.queue_frame(&reply);
            }
        } else if code == codes.command {
            let payload = frame.payload().to_vec();
            let (action, target) = (payload[0], payload[1]);
            self.commands.push(payload);
            if self.drop_on_command {
                self.connected = false;
                return;
            }
            match self.command_reply {
                CommandReply::Ack => {
                    let ack = self.protocol.command_ack_frame(action, target).unwrap();
                    self.queue_frame(&ack);
                }
                CommandReply::Nack(code) => {
                    let nack = self.protocol.nack_frame(code).unwrap();
                    self.queue_frame(&nack);
                }
                CommandReply::Silent => {}
            }
        }
    }
}

/// Test-side handle onto a simulated panel.
#[derive(Clone)]
pub struct FakePanel {
    sim: Arc<Mutex<PanelSim>>,
    wake: Arc<Notify>,
}

impl FakePanel {
    pub fn new() -> Self {
        let protocol = ParadoxProtocol::new(PanelModel::Spectra, PC_PASSWORD).unwrap();
        Self {
            sim: Arc::new(Mutex::new(PanelSim {
                protocol,
                panel: PanelState::new(),
                reject_login: false,
                silent: false,
                corrupt_next: 0,
                command_reply: CommandReply::Ack,
                drop_on_command: false,
                fail_connects: 0,
                connect_attempts: 0,
                logins: 0,
                status_requests: 0,
                commands: Vec::new(),
                connected: false,
                outbound: VecDeque::new(),
            })),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Inspect or change the simulation.
    pub fn with<R>(&self, f: impl FnOnce(&mut PanelSim) -> R) -> R {
        let mut sim = self.sim.lock().unwrap();
        f(&mut *sim)
    }

    /// Push an unsolicited frame to the gateway.
    pub fn push_frame(&self, frame: &Frame) {
        self.with(|sim| sim.queue_frame(frame));
        self.wake.notify_one();
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport { panel: self.clone() }
    }

    pub fn boxed_transport(&self) -> Box<dyn Transport> {
        Box::new(self.transport())
    }
}

pub struct FakeTransport {
    panel: FakePanel,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<()> {
        self.panel.with(|sim| {
            sim.connect_attempts += 1;
            if sim.fail_connects > 0 {
                sim.fail_connects -= 1;
                return Err(GatewayError::TransportUnavailable {
                    target: "fake panel".into(),
                    reason: "scripted failure".into(),
                });
            }
            sim.connected = true;
            sim.outbound.clear();
            Ok(())
        })
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.panel.with(|sim| sim.connected = false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.panel.with(|sim| sim.connected)
    }

    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let chunk = self.panel.with(|sim| {
                if !sim.connected {
                    return Err(GatewayError::NotConnected);
                }
                let n = sim.outbound.len().min(max_bytes);
                Ok(sim.outbound.drain(..n).collect::<Vec<u8>>())
            })?;
            if !chunk.is_empty() {
                return Ok(Bytes::from(chunk));
            }
            if tokio::time::timeout_at(deadline, self.panel.wake.notified())
                .await
                .is_err()
            {
                return Err(GatewayError::IoTimeout);
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut reader = FrameReader::new();
        reader.push(data);
        self.panel.with(|sim| {
            if !sim.connected {
                return Err(GatewayError::NotConnected);
            }
            while let Some(frame) = reader.next_frame() {
                sim.handle(frame.expect("gateway sent a bad frame"));
            }
            Ok(())
        })?;
        self.panel.wake.notify_one();
        Ok(data.len())
    }

    fn describe(&self) -> String {
        "fake panel".into()
    }
}

// ---------------------------------------------------------------------------
// Recording interface
// ---------------------------------------------------------------------------

/// Interface that records every event, optionally slow or failing.
pub struct Recorder {
    name: String,
    events: Mutex<Vec<PanelEvent>>,
    delay: Option<Duration>,
    fail_events: bool,
    panic_on: Option<usize>,
    fail_start: bool,
    fail_stop: bool,
    stop_delay: Option<Duration>,
    stopped: AtomicBool,
    stop_calls: AtomicUsize,
    sink: Mutex<Option<CommandSink>>,
}

impl Recorder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
            delay: None,
            fail_events: false,
            panic_on: None,
            fail_start: false,
            fail_stop: false,
            stop_delay: None,
            stopped: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            sink: Mutex::new(None),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every `receive_event` returns an error (after recording).
    pub fn failing(mut self) -> Self {
        self.fail_events = true;
        self
    }

    /// Panic on the n-th event (0-based, after recording).
    pub fn panicking_on(mut self, n: usize) -> Self {
        self.panic_on = Some(n);
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn events(&self) -> Vec<PanelEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn connection_states(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PanelEvent::ConnectionChanged { new, .. } => Some(new),
                _ => None,
            })
            .collect()
    }

    pub fn command_results(&self) -> Vec<PanelEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, PanelEvent::CommandResult { .. }))
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn sink(&self) -> CommandSink {
        self.sink.lock().unwrap().clone().expect("recorder not started")
    }

    /// Wait (on the test clock) until `done` holds for the recorded events.
    pub async fn wait_until(&self, done: impl Fn(&[PanelEvent]) -> bool) {
        for _ in 0..2000 {
            if done(self.events.lock().unwrap().as_slice()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{}: condition not met, got {:#?}", self.name, self.events());
    }
}

#[async_trait]
impl Interface for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, commands: CommandSink) -> Result<()> {
        if self.fail_start {
            return Err(GatewayError::ChannelClosed);
        }
        *self.sink.lock().unwrap() = Some(commands);
        Ok(())
    }

    async fn receive_event(&self, event: &PanelEvent) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let index = {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            events.len() - 1
        };
        if self.panic_on == Some(index) {
            panic!("{} told to panic on event {}", self.name, index);
        }
        if self.fail_events {
            return Err(GatewayError::ChannelClosed);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stop {
            return Err(GatewayError::ChannelClosed);
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
