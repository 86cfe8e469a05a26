use anyhow::Result;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::{Notification, PushMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::Store;

/// Hands a resolved push message to whatever delivers it to devices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &PushMessage) -> Result<()>;
}

/// Publishes push messages to a Kafka topic for the push gateway to pick up.
pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn deliver(&self, message: &PushMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let key = message.data.get("reservationId").cloned().unwrap_or_default();
        let record = FutureRecord::to(&self.topic).payload(&json).key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish push message: {}", e))?;

        debug!("Published push message for {} device(s) to {}", message.tokens.len(), self.topic);
        Ok(())
    }
}

/// Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &PushMessage) -> Result<()> {
        info!(
            devices = message.tokens.len(),
            title = %message.title,
            body = %message.body,
            "Push notification (no broker configured)"
        );
        Ok(())
    }
}

/// Resolves notification targets to device tokens and sends in the background.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Fire-and-forget: failures are logged and never reach the caller.
    pub fn dispatch(&self, notification: Notification) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let title = notification.title.clone();
            if let Err(e) = dispatcher.send(notification).await {
                error!("Failed to send notification '{}': {:#}", title, e);
            }
        })
    }

    /// Returns whether anything was handed to the notifier.
    pub async fn send(&self, notification: Notification) -> Result<bool> {
        let tokens = self.store.push_tokens_for(&notification.target).await?;
        if tokens.is_empty() {
            debug!("No push recipients for '{}'", notification.title);
            return Ok(false);
        }

        let message = PushMessage::new(notification, tokens);
        self.notifier.deliver(&message).await?;
        Ok(true)
    }
}
