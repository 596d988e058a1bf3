// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Streaming module - republishes engine events over MQTT

mod mqtt;

pub use mqtt::MqttClient;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::core::{EngineEvent, Event};

/// One outgoing MQTT message
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Map an engine event to the message dashboards expect, if any.
///
/// `<prefix>/status` carries the latest snapshot (retained),
/// `<prefix>/alerts` each alarm start, `<prefix>/schedule` the next
/// scheduled transition (retained).
pub fn route(prefix: &str, event: &EngineEvent) -> Result<Option<Outgoing>> {
    let (suffix, payload, retain) = match event {
        EngineEvent::Status(snapshot) => ("status", serde_json::to_vec(snapshot)?, true),
        EngineEvent::AlarmStarted { alert, .. } => ("alerts", serde_json::to_vec(alert)?, false),
        EngineEvent::NextSchedule(next) => ("schedule", serde_json::to_vec(next)?, true),
        EngineEvent::AlarmStopped { .. } => return Ok(None),
    };

    Ok(Some(Outgoing {
        topic: format!("{}/{}", prefix.trim_end_matches('/'), suffix),
        payload,
        retain,
    }))
}

/// Forwards engine events to an MQTT broker
pub struct MqttBridge {
    client: MqttClient,
    prefix: String,
}

impl MqttBridge {
    pub fn new(config: &MqttConfig) -> Self {
        Self {
            client: MqttClient::new(config),
            prefix: config.topic_prefix.clone(),
        }
    }

    pub async fn run(self, mut events: broadcast::Receiver<Event>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("MQTT bridge publishing under '{}' to {}", self.prefix, self.client.endpoint());

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.forward(&event.payload).await,
                    Err(RecvError::Lagged(skipped)) => warn!("MQTT bridge lagged, skipped {} events", skipped),
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => {
                    info!("MQTT bridge shutting down...");
                    break;
                }
            }
        }

        self.client.disconnect().await
    }

    async fn forward(&self, event: &EngineEvent) {
        match route(&self.prefix, event) {
            Ok(Some(message)) => {
                debug!("MQTT -> {}", message.topic);
                if let Err(e) = self.client.publish(&message.topic, message.payload, message.retain).await {
                    warn!("{}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not encode event for MQTT: {}", e),
        }
    }
}
