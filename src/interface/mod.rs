// MIT License - Copyright (c) 2026 Peter Wright
// Notification and control front-ends

pub mod ip;
pub mod log;
pub mod manager;
pub mod mqtt;
pub mod payload;

use async_trait::async_trait;

use crate::error::Result;
use crate::event::PanelEvent;

pub use manager::{CommandSink, InterfaceManager, StopOutcome, StopReport};

/// A front-end plugged into the gateway.
///
/// Every method may be called from a different task. `receive_event` is called
/// once per event, in publish order, never concurrently for one interface.
#[async_trait]
pub trait Interface: Send + Sync {
    /// Unique name, used for command routing and logs.
    fn name(&self) -> &str;

    /// Begin background work. Commands go back through `commands`.
    async fn start(&self, commands: CommandSink) -> Result<()>;

    async fn receive_event(&self, event: &PanelEvent) -> Result<()>;

    /// Release resources. Must be idempotent.
    async fn stop(&self) -> Result<()>;
}
