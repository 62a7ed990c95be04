// MIT License - Copyright (c) 2026 Peter Wright
// MQTT front-end: JSON events out, JSON commands in

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::payload::{CmdAck, CommandRequest, EventPayload, entity_path};
use super::{CommandSink, Interface};
use crate::config::{Labels, MqttConfig};
use crate::error::{GatewayError, Result};
use crate::event::PanelEvent;

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

/// Publishes panel events to a broker and takes commands from `<topic>/cmd`.
///
/// Topics under the configured base `<topic>`:
/// - `<topic>`: every event and every `CMD_ACK`
/// - `<topic>/zones/<id>`, `partitions/<id>`, `outputs/<id>`, `system`,
///   `connection`: latest value, retained
/// - `<topic>/availability`: `online` / `offline` (last will), retained
/// - `<topic>/cmd`: inbound commands
pub struct MqttInterface {
    name: String,
    config: MqttConfig,
    labels: Labels,
    client: Mutex<Option<AsyncClient>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttInterface {
    pub fn new(config: MqttConfig, labels: Labels) -> Self {
        Self {
            name: "mqtt".into(),
            config,
            labels,
            client: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.config.topic)
    }

    pub fn command_topic(&self) -> String {
        format!("{}/cmd", self.config.topic)
    }

    fn options(&self) -> Result<MqttOptions> {
        let (host, port) = parse_mqtt_url(&self.config.url)?;
        let mut opts = MqttOptions::new(&self.config.client_id, host, port);
        opts.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        if let Some(username) = &self.config.username {
            opts.set_credentials(username, self.config.password.clone().unwrap_or_default());
        }
        opts.set_last_will(LastWill::new(
            self.availability_topic(),
            OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));
        Ok(opts)
    }

    fn client(&self) -> Option<AsyncClient> {
        self.client.lock().ok().and_then(|c| c.clone())
    }
}

#[async_trait]
impl Interface for MqttInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, commands: CommandSink) -> Result<()> {
        let opts = self.options()?;
        let (client, eventloop) = AsyncClient::new(opts, 256);
        info!("MQTT: connecting to {}", self.config.url);

        let task = tokio::spawn(run_eventloop(
            eventloop,
            client.clone(),
            self.config.topic.clone(),
            self.command_topic(),
            self.availability_topic(),
            commands,
        ));
        if let Ok(mut slot) = self.client.lock() {
            *slot = Some(client);
        }
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    async fn receive_event(&self, event: &PanelEvent) -> Result<()> {
        let client = self.client().ok_or(GatewayError::ChannelClosed)?;
        let topic = &self.config.topic;

        if let PanelEvent::CommandResult { command, outcome, .. } = event {
            publish_json(&client, topic, &CmdAck::new(command, outcome), false).await;
            return Ok(());
        }

        if let Some(payload) = EventPayload::from_event(event, &self.labels) {
            publish_json(&client, topic, &payload, false).await;
            if let Some(path) = entity_path(event) {
                publish_json(&client, &format!("{}/{}", topic, path), &payload, true).await;
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let client = self.client.lock().ok().and_then(|mut c| c.take());
        if let Some(client) = client {
            if let Err(e) = client
                .publish(self.availability_topic(), QoS::AtLeastOnce, true, OFFLINE)
                .await
            {
                debug!("MQTT: could not publish offline status: {}", e);
            }
            if let Err(e) = client.disconnect().await {
                debug!("MQTT: disconnect failed: {}", e);
            }
        }
        // Give the event loop a moment to flush the disconnect before aborting it.
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(mut task) = task {
            if tokio::time::timeout(Duration::from_millis(500), &mut task).await.is_err() {
                task.abort();
            }
        }
        Ok(())
    }
}

async fn run_eventloop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    cmd_topic: String,
    availability: String,
    commands: CommandSink,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // rumqttc does not resubscribe after a broker reconnect.
                info!("MQTT: connected, subscribing to {}", cmd_topic);
                if let Err(e) = client.subscribe(&cmd_topic, QoS::AtLeastOnce).await {
                    error!("Failed to subscribe to {}: {}", cmd_topic, e);
                }
                if let Err(e) = client.publish(&availability, QoS::AtLeastOnce, true, ONLINE).await {
                    error!("Failed to publish availability: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(msg))) => {
                if msg.topic != cmd_topic {
                    continue;
                }
                let payload = String::from_utf8_lossy(&msg.payload);
                match serde_json::from_str::<CommandRequest>(&payload) {
                    Ok(request) => {
                        info!("MQTT command received: {} {:?} {}", request.target, request.id, request.action);
                        handle_request(&client, &topic, &commands, request).await;
                    }
                    Err(e) => warn!("Failed to parse MQTT command: {}", e),
                }
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                debug!("MQTT: disconnecting");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT event loop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Submit a request; anything that does not become a queued command is
/// answered with a negative `CMD_ACK` straight away.
async fn handle_request(client: &AsyncClient, topic: &str, commands: &CommandSink, request: CommandRequest) {
    let src = CommandRequest {
        code: None,
        ..request.clone()
    };
    let result = match request.into_command() {
        Ok(command) => commands.submit(command).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!("MQTT command refused: {}", e);
        publish_json(client, topic, &CmdAck::invalid(src, e.to_string()), false).await;
    }
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {}: {}", topic, e);
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {}", e),
    }
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
pub fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .ok_or_else(|| GatewayError::config(format!("MQTT URL must be mqtt://host:port, got '{}'", url)))?;
    if host.is_empty() {
        return Err(GatewayError::config(format!("MQTT URL has no host: '{}'", url)));
    }
    let port = port_str
        .parse::<u16>()
        .map_err(|_| GatewayError::config(format!("invalid MQTT port '{}'", port_str)))?;

    Ok((host.to_string(), port))
}
