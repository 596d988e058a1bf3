// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Notification fan-out - email/SMS delivery, alert log and siren
//!
//! Every sink here is fire-and-forget from the engine's point of view:
//! failures are logged and never reach the consumer loop.

mod alert_log;
mod siren;

pub use alert_log::{AlertLog, AlertRecord};
pub use siren::{CommandSiren, LogSiren, Siren};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;

/// Outbound notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => f.write_str("email"),
            Channel::Sms => f.write_str("sms"),
        }
    }
}

/// Delivers alert messages over one channel
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &str) -> Result<()>;
}

/// Notifier used when no delivery backend is configured
pub struct LogNotifier {
    channel: Channel,
}

impl LogNotifier {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &str) -> Result<()> {
        info!("[{}] {}", self.channel, message);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: Channel,
    message: &'a str,
    sent_at: String,
}

/// Posts alerts as JSON to a gateway URL (mail relay, SMS provider)
pub struct WebhookNotifier {
    channel: Channel,
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(channel: Channel, url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            channel,
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &str) -> Result<()> {
        let payload = WebhookPayload {
            channel: self.channel,
            message,
            sent_at: chrono::Utc::now().to_rfc3339(),
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("{} gateway answered {}", self.channel, response.status()));
        }

        debug!("{} notification delivered", self.channel);
        Ok(())
    }
}

/// Routes messages to the notifier of each channel
#[derive(Clone, Default)]
pub struct NotificationHub {
    notifiers: HashMap<Channel, Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Webhook notifiers where a URL is configured, log-only otherwise
    pub fn from_config(config: &NotifyConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut hub = Self::new();

        for (channel, url) in [
            (Channel::Email, config.email_webhook.as_deref()),
            (Channel::Sms, config.sms_webhook.as_deref()),
        ] {
            let notifier: Arc<dyn Notifier> = match url {
                Some(url) => match WebhookNotifier::new(channel, url, timeout) {
                    Ok(webhook) => {
                        info!("{} notifications via {}", channel, url);
                        Arc::new(webhook)
                    }
                    Err(e) => {
                        warn!("Could not set up {} webhook ({}), logging only", channel, e);
                        Arc::new(LogNotifier::new(channel))
                    }
                },
                None => Arc::new(LogNotifier::new(channel)),
            };
            hub.register(notifier);
        }

        hub
    }

    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.channel(), notifier);
    }

    /// Deliver one message; errors are logged
    pub async fn deliver(&self, channel: Channel, message: &str) {
        match self.notifiers.get(&channel) {
            Some(notifier) => {
                if let Err(e) = notifier.send(message).await {
                    warn!("{} notification failed: {}", channel, e);
                }
            }
            None => debug!("No {} notifier registered", channel),
        }
    }

    /// Send in the background without waiting for delivery
    pub fn dispatch(&self, channel: Channel, message: String) {
        let hub = self.clone();
        tokio::spawn(async move {
            hub.deliver(channel, &message).await;
        });
    }
}
