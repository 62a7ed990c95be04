// MIT License - Copyright (c) 2026 Peter Wright
// Paradox alarm panel gateway
//
//! # paradox-gateway
//!
//! Keeps a session open with a Paradox alarm panel over RS-232 or the IP
//! module tunnel, decodes its status into partitions, zones, outputs and
//! system flags, and republishes every change to a set of front-ends
//! (MQTT, a local TCP listener, the log). Commands from those front-ends
//! are queued and written back to the panel.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use paradox_gateway::{
//!     EngineSettings, Engine, InterfaceManager, PanelModel, RetryPolicy, SerialTransport, Supervisor,
//! };
//! use paradox_gateway::config::{Labels, LogConfig};
//! use paradox_gateway::interface::log::LogInterface;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = EngineSettings::builder()
//!         .model(PanelModel::Spectra)
//!         .pc_password("0000")
//!         .build()?;
//!
//!     let manager = InterfaceManager::new(settings.command_queue_depth);
//!     let log = Arc::new(LogInterface::new(LogConfig::default(), Labels::default()));
//!     manager.start_interface(log, false).await?;
//!
//!     let engine = Engine::new(settings, manager.clone())?;
//!     let transport = Box::new(SerialTransport::new("/dev/ttyUSB0", 9600));
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!
//!     Supervisor::new(manager, engine, transport, RetryPolicy::default(), shutdown)
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod constants;
pub mod devices;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod interface;
pub mod model;
pub mod protocol;
pub mod state;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use command::{Action, Command, CommandOutcome, CommandQueue, Target};
pub use config::{EngineSettings, EngineSettingsBuilder, GatewayConfig};
pub use devices::{OutputStatus, PartitionStatusFlags, SystemStatusFlags, ZoneStatusFlags};
pub use engine::{Engine, SessionEnd};
pub use error::{GatewayError, PanelErrorCode, Result};
pub use event::PanelEvent;
pub use frame::{Frame, FrameReader};
pub use interface::{CommandSink, Interface, InterfaceManager, StopOutcome, StopReport};
pub use model::PanelModel;
pub use protocol::{PanelProtocol, ParadoxProtocol};
pub use state::{ConnectionState, PanelState};
pub use supervisor::{RetryPolicy, Supervisor};
pub use transport::{IpTransport, SerialTransport, Transport};
