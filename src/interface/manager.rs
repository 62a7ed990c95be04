// MIT License - Copyright (c) 2026 Peter Wright
// In-process event bus between the engine and the interfaces

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::Interface;
use crate::command::{Command, CommandOutcome, CommandQueue, QueuedCommand};
use crate::error::{GatewayError, Result};
use crate::event::PanelEvent;
use crate::state::PanelState;

/// Default bound on each interface's `stop`.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Registration {
    name: String,
    interface: Arc<dyn Interface>,
    tx: mpsc::UnboundedSender<Arc<PanelEvent>>,
    delivery: JoinHandle<()>,
}

struct Inner {
    registry: Mutex<Vec<Registration>>,
    state: watch::Sender<PanelState>,
    queue: Arc<CommandQueue>,
    stop_timeout: Duration,
}

/// How an interface responded to `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    Failed(String),
    /// Did not finish within the bound and was aborted.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub name: String,
    pub outcome: StopOutcome,
}

/// Registry of interfaces plus the shared command queue.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct InterfaceManager {
    inner: Arc<Inner>,
}

impl InterfaceManager {
    pub fn new(queue_depth: usize) -> Self {
        Self::with_stop_timeout(queue_depth, DEFAULT_STOP_TIMEOUT)
    }

    pub fn with_stop_timeout(queue_depth: usize, stop_timeout: Duration) -> Self {
        let (state, _) = watch::channel(PanelState::default());
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Vec::new()),
                state,
                queue: Arc::new(CommandQueue::new(queue_depth)),
                stop_timeout,
            }),
        }
    }

    /// Queue the engine drains.
    pub fn command_queue(&self) -> Arc<CommandQueue> {
        self.inner.queue.clone()
    }

    /// Watch the latest published panel state.
    pub fn subscribe_state(&self) -> watch::Receiver<PanelState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> PanelState {
        self.inner.state.borrow().clone()
    }

    /// Handle an interface uses to submit commands under `origin`.
    pub fn command_sink(&self, origin: impl Into<String>) -> CommandSink {
        CommandSink {
            origin: origin.into(),
            manager: Arc::downgrade(&self.inner),
        }
    }

    /// Names of registered interfaces, in registration order.
    pub async fn registered(&self) -> Vec<String> {
        self.inner
            .registry
            .lock()
            .await
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Add an interface to the bus.
    ///
    /// With `initial`, the interface first receives one event per entity in
    /// the current state, ahead of any later live event.
    pub async fn register(
        &self,
        name: impl Into<String>,
        interface: Arc<dyn Interface>,
        initial: bool,
    ) -> Result<()> {
        let name = name.into();
        let mut registry = self.inner.registry.lock().await;
        if registry.iter().any(|r| r.name == name) {
            return Err(GatewayError::DuplicateInterface { name });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if initial {
            // Still holding the registry lock, so no publish can slip in first.
            let replay = self.inner.state.borrow().replay_events();
            debug!("Replaying {} entities to {}", replay.len(), name);
            for event in replay {
                let _ = tx.send(Arc::new(event));
            }
        }
        let delivery = tokio::spawn(deliver(name.clone(), interface.clone(), rx));
        registry.push(Registration {
            name: name.clone(),
            interface,
            tx,
            delivery,
        });
        info!("Registered interface {}{}", name, if initial { " (with replay)" } else { "" });
        Ok(())
    }

    /// Start an interface and register it if it starts cleanly.
    pub async fn start_interface(&self, interface: Arc<dyn Interface>, initial: bool) -> Result<()> {
        let name = interface.name().to_string();
        if self.registered().await.contains(&name) {
            return Err(GatewayError::DuplicateInterface { name });
        }
        interface
            .start(self.command_sink(name.clone()))
            .await
            .map_err(|e| GatewayError::InterfaceStartupFailure {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        if let Err(e) = self.register(name, interface.clone(), initial).await {
            let _ = interface.stop().await;
            return Err(e);
        }
        Ok(())
    }

    /// Deliver one event to every interface (or only its recipient).
    pub async fn publish(&self, event: PanelEvent) {
        let registry = self.inner.registry.lock().await;
        dispatch(&registry, Arc::new(event));
    }

    /// Record a new state snapshot and deliver the events it produced.
    ///
    /// Both happen under the registry lock so a concurrent `register` sees
    /// either the old state and these events, or the new state and none of them.
    pub async fn publish_state(&self, state: &PanelState, events: Vec<PanelEvent>) {
        let registry = self.inner.registry.lock().await;
        self.inner.state.send_replace(state.clone());
        for event in events {
            dispatch(&registry, Arc::new(event));
        }
    }

    /// Queue a command for the engine on behalf of `origin`.
    pub async fn submit_command(&self, origin: &str, command: Command) -> Result<()> {
        debug!("{} submitted '{}'", origin, command);
        let evicted = self
            .inner
            .queue
            .push(QueuedCommand {
                origin: origin.to_string(),
                command,
            })
            .await?;
        if let Some(old) = evicted {
            self.publish(PanelEvent::CommandResult {
                origin: old.origin,
                command: old.command,
                outcome: CommandOutcome::Evicted,
            })
            .await;
        }
        Ok(())
    }

    /// Close the command queue and stop every interface.
    ///
    /// Commands still queued are reported to their origin as not sent. Each
    /// interface receives its pending events before `stop` is called. All
    /// interfaces stop concurrently; any still running after the stop timeout
    /// is aborted and reported as abandoned.
    pub async fn stop(&self) -> Vec<StopReport> {
        let dropped = self.inner.queue.close().await;
        let registrations = {
            let mut registry = self.inner.registry.lock().await;
            if !dropped.is_empty() {
                warn!("Dropping {} queued commands at shutdown", dropped.len());
            }
            for queued in dropped {
                dispatch(
                    &registry,
                    Arc::new(PanelEvent::CommandResult {
                        origin: queued.origin,
                        command: queued.command,
                        outcome: CommandOutcome::NotSent("gateway shutting down".into()),
                    }),
                );
            }
            std::mem::take(&mut *registry)
        };
        let deadline = Instant::now() + self.inner.stop_timeout;

        let stopping: Vec<_> = registrations
            .into_iter()
            .map(|reg| {
                let Registration {
                    name,
                    interface,
                    tx,
                    delivery,
                } = reg;
                // Closing the channel lets delivery finish what is already queued.
                drop(tx);
                let delivery_abort = delivery.abort_handle();
                let task = tokio::spawn(async move {
                    let _ = delivery.await;
                    interface.stop().await
                });
                (name, task, delivery_abort)
            })
            .collect();

        let mut reports = Vec::with_capacity(stopping.len());
        for (name, mut task, delivery) in stopping {
            let outcome = match timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => StopOutcome::Stopped,
                Ok(Ok(Err(e))) => StopOutcome::Failed(e.to_string()),
                Ok(Err(e)) => StopOutcome::Failed(format!("stop panicked: {}", e)),
                Err(_) => {
                    task.abort();
                    StopOutcome::Abandoned
                }
            };
            delivery.abort();
            match &outcome {
                StopOutcome::Stopped => info!("Interface {} stopped", name),
                StopOutcome::Failed(reason) => warn!("Interface {} failed to stop: {}", name, reason),
                StopOutcome::Abandoned => warn!("Interface {} did not stop in time, abandoned", name),
            }
            reports.push(StopReport { name, outcome });
        }
        reports
    }
}

fn dispatch(registry: &[Registration], event: Arc<PanelEvent>) {
    match event.recipient() {
        Some(origin) => match registry.iter().find(|r| r.name == origin) {
            Some(reg) => {
                let _ = reg.tx.send(event.clone());
            }
            None => debug!("Dropping {} for unregistered interface {}", event.topic(), origin),
        },
        None => {
            for reg in registry {
                if reg.tx.send(event.clone()).is_err() {
                    debug!("Delivery to {} has ended", reg.name);
                }
            }
        }
    }
}

/// Per-interface delivery loop.
///
/// Each call runs in its own task so a panic is contained; calls are awaited
/// one at a time to keep publish order.
async fn deliver(
    name: String,
    interface: Arc<dyn Interface>,
    mut rx: mpsc::UnboundedReceiver<Arc<PanelEvent>>,
) {
    while let Some(event) = rx.recv().await {
        let iface = interface.clone();
        let ev = event.clone();
        match tokio::spawn(async move { iface.receive_event(&ev).await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Interface {} failed on {}: {}", name, event.topic(), e),
            Err(e) if e.is_panic() => warn!("Interface {} panicked on {}", name, event.topic()),
            Err(_) => return,
        }
    }
    debug!("Delivery to {} finished", name);
}

/// Submits commands to the manager under a fixed origin name.
///
/// Holds only a weak reference, so a sink kept by an interface does not keep
/// the manager alive.
#[derive(Clone)]
pub struct CommandSink {
    origin: String,
    manager: Weak<Inner>,
}

impl CommandSink {
    /// A sink attached to nothing; every submit fails.
    pub fn detached(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            manager: Weak::new(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub async fn submit(&self, command: Command) -> Result<()> {
        let inner = self.manager.upgrade().ok_or(GatewayError::QueueClosed)?;
        InterfaceManager { inner }.submit_command(&self.origin, command).await
    }
}

impl fmt::Debug for CommandSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSink")
            .field("origin", &self.origin)
            .field("attached", &(self.manager.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Action, Target};

    #[tokio::test]
    async fn test_detached_sink_refuses() {
        let sink = CommandSink::detached("nobody");
        let cmd = Command::new(Target::Partition(1), Action::Arm, None).unwrap();
        assert!(matches!(sink.submit(cmd).await, Err(GatewayError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_sink_does_not_keep_manager_alive() {
        let manager = InterfaceManager::new(4);
        let sink = manager.command_sink("mqtt");
        assert!(format!("{:?}", sink).contains("attached: true"));
        drop(manager);
        let cmd = Command::new(Target::Partition(1), Action::Arm, None).unwrap();
        assert!(sink.submit(cmd).await.is_err());
    }

    #[tokio::test]
    async fn test_submit_reaches_queue() {
        let manager = InterfaceManager::new(4);
        let cmd = Command::new(Target::Zone(3), Action::Bypass, None).unwrap();
        manager.command_sink("ip").submit(cmd.clone()).await.unwrap();
        let queued = manager.command_queue().pop().await.unwrap();
        assert_eq!(queued.origin, "ip");
        assert_eq!(queued.command, cmd);
    }

    #[tokio::test]
    async fn test_publish_state_updates_snapshot() {
        let manager = InterfaceManager::new(4);
        let mut rx = manager.subscribe_state();
        let mut state = PanelState::new();
        state.fresh = true;
        manager.publish_state(&state, Vec::new()).await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().fresh);
        assert!(manager.snapshot().fresh);
    }
}
