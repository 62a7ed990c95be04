// MIT License - Copyright (c) 2026 Peter Wright
// Gateway configuration

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::DEFAULT_IP_PORT;
use crate::error::{GatewayError, Result};
use crate::model::PanelModel;
use crate::protocol::pack_pc_password;

// ---------------------------------------------------------------------------
// TOML file
// ---------------------------------------------------------------------------

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub panel: PanelToml,
    #[serde(default)]
    pub retry: RetryToml,
    #[serde(default)]
    pub interfaces: InterfacesToml,
    #[serde(default)]
    pub labels: Labels,
}

/// How to reach the panel. Exactly one is configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Serial {
        device: String,
        /// Defaults to the panel model's baud rate.
        #[serde(default)]
        baud: Option<u32>,
    },
    Ip {
        host: String,
        #[serde(default = "default_ip_port")]
        port: u16,
        password: String,
        #[serde(default = "default_connect_timeout")]
        connect_timeout_ms: u64,
    },
}

fn default_ip_port() -> u16 {
    DEFAULT_IP_PORT
}
fn default_connect_timeout() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelToml {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_pc_password")]
    pub pc_password: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_ms: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_max_timeouts")]
    pub max_consecutive_timeouts: u32,
    #[serde(default = "default_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_model() -> String {
    "spectra".to_string()
}
fn default_pc_password() -> String {
    "0000".to_string()
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_read_timeout() -> u64 {
    1000
}
fn default_login_timeout() -> u64 {
    5000
}
fn default_command_timeout() -> u64 {
    3000
}
fn default_max_timeouts() -> u32 {
    5
}
fn default_queue_depth() -> usize {
    64
}

impl Default for PanelToml {
    fn default() -> Self {
        Self {
            model: default_model(),
            pc_password: default_pc_password(),
            poll_interval_ms: default_poll_interval(),
            read_timeout_ms: default_read_timeout(),
            login_timeout_ms: default_login_timeout(),
            command_timeout_ms: default_command_timeout(),
            max_consecutive_timeouts: default_max_timeouts(),
            command_queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryToml {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Absent means retry forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}

impl Default for RetryToml {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: None,
        }
    }
}

/// Interfaces to start. A present section enables the interface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfacesToml {
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub ip: Option<IpListenerConfig>,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Base topic; commands arrive on `<topic>/cmd`.
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_client_id() -> String {
    "paradox-gateway".to_string()
}
fn default_topic() -> String {
    "paradox".to_string()
}
fn default_keep_alive() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpListenerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:10001".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Also log zone events that only changed bypass or battery flags.
    #[serde(default)]
    pub verbose: bool,
}

/// Display names keyed by entity id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Labels {
    #[serde(default, deserialize_with = "deserialize_id_map")]
    pub zones: HashMap<u32, String>,
    #[serde(default, deserialize_with = "deserialize_id_map")]
    pub partitions: HashMap<u32, String>,
    #[serde(default, deserialize_with = "deserialize_id_map")]
    pub outputs: HashMap<u32, String>,
}

fn deserialize_id_map<'de, D>(deserializer: D) -> std::result::Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid entity ID: {k}")))
        })
        .collect()
}

impl Labels {
    pub fn zone(&self, id: u32) -> String {
        self.zones.get(&id).cloned().unwrap_or_else(|| format!("Zone {id}"))
    }

    pub fn partition(&self, id: u32) -> String {
        self.partitions.get(&id).cloned().unwrap_or_else(|| format!("Partition {id}"))
    }

    pub fn output(&self, id: u32) -> String {
        self.outputs.get(&id).cloned().unwrap_or_else(|| format!("Output {id}"))
    }
}

impl GatewayConfig {
    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: GatewayConfig =
            toml::from_str(text).map_err(|e| GatewayError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.connection {
            ConnectionConfig::Serial { device, baud } => {
                if device.trim().is_empty() {
                    return Err(GatewayError::config("serial device path is empty"));
                }
                if *baud == Some(0) {
                    return Err(GatewayError::config("serial baud must be positive"));
                }
            }
            ConnectionConfig::Ip { host, port, .. } => {
                if host.trim().is_empty() {
                    return Err(GatewayError::config("ip host is empty"));
                }
                if *port == 0 {
                    return Err(GatewayError::config("ip port must be positive"));
                }
            }
        }
        self.engine_settings()?;
        if self.retry.initial_delay_ms == 0 || self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(GatewayError::config(
                "retry delays must be positive with max_delay_ms >= initial_delay_ms",
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(GatewayError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Engine settings derived from the `[panel]` section.
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        let p = &self.panel;
        let model: PanelModel = p.model.parse()?;
        EngineSettings::builder()
            .model(model)
            .pc_password(p.pc_password.clone())
            .poll_interval(Duration::from_millis(p.poll_interval_ms))
            .read_timeout(Duration::from_millis(p.read_timeout_ms))
            .login_timeout(Duration::from_millis(p.login_timeout_ms))
            .command_timeout(Duration::from_millis(p.command_timeout_ms))
            .max_consecutive_timeouts(p.max_consecutive_timeouts)
            .command_queue_depth(p.command_queue_depth)
            .build()
    }
}

// ---------------------------------------------------------------------------
// Engine settings
// ---------------------------------------------------------------------------

/// Tunables for the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub model: PanelModel,
    /// Four hex digit PC password sent at login.
    pub pc_password: String,
    /// Pause between polling cycles.
    pub poll_interval: Duration,
    /// Wait for each status response.
    pub read_timeout: Duration,
    /// Wait for the login acknowledgement.
    pub login_timeout: Duration,
    /// Wait for a command acknowledgement.
    pub command_timeout: Duration,
    /// Consecutive read timeouts that fail the session.
    pub max_consecutive_timeouts: u32,
    pub command_queue_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: PanelModel::Spectra,
            pc_password: default_pc_password(),
            poll_interval: Duration::from_millis(default_poll_interval()),
            read_timeout: Duration::from_millis(default_read_timeout()),
            login_timeout: Duration::from_millis(default_login_timeout()),
            command_timeout: Duration::from_millis(default_command_timeout()),
            max_consecutive_timeouts: default_max_timeouts(),
            command_queue_depth: default_queue_depth(),
        }
    }
}

impl EngineSettings {
    pub fn builder() -> EngineSettingsBuilder {
        EngineSettingsBuilder::default()
    }
}

/// Builder for EngineSettings.
#[derive(Debug, Clone, Default)]
pub struct EngineSettingsBuilder {
    settings: EngineSettings,
}

impl EngineSettingsBuilder {
    pub fn model(mut self, model: PanelModel) -> Self {
        self.settings.model = model;
        self
    }

    pub fn pc_password(mut self, password: impl Into<String>) -> Self {
        self.settings.pc_password = password.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout = timeout;
        self
    }

    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.settings.login_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.settings.command_timeout = timeout;
        self
    }

    pub fn max_consecutive_timeouts(mut self, count: u32) -> Self {
        self.settings.max_consecutive_timeouts = count;
        self
    }

    pub fn command_queue_depth(mut self, depth: usize) -> Self {
        self.settings.command_queue_depth = depth;
        self
    }

    /// Validate and return the settings.
    pub fn build(self) -> Result<EngineSettings> {
        let s = self.settings;
        pack_pc_password(&s.pc_password)?;
        if s.command_queue_depth == 0 {
            return Err(GatewayError::config("command_queue_depth must be at least 1"));
        }
        if s.max_consecutive_timeouts == 0 {
            return Err(GatewayError::config("max_consecutive_timeouts must be at least 1"));
        }
        if s.read_timeout.is_zero() || s.login_timeout.is_zero() || s.command_timeout.is_zero() {
            return Err(GatewayError::config("timeouts must be positive"));
        }
        Ok(s)
    }
}
