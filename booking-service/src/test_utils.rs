//! Helpers shared by the unit and HTTP tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::PushMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::admission::{AdmissionEngine, BookingSettings};
use crate::auth::AuthSettings;
use crate::models::{NewResource, NewUser, Resource, User};
use crate::notifications::{NotificationDispatcher, Notifier};
use crate::store::{MemoryStore, Store};

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough";

/// Forwards every delivered message to a channel the test can read.
pub struct RecordingNotifier {
    sender: mpsc::UnboundedSender<PushMessage>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, message: &PushMessage) -> anyhow::Result<()> {
        self.sender.send(message.clone())?;
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn deliver(&self, _message: &PushMessage) -> anyhow::Result<()> {
        anyhow::bail!("push gateway unavailable")
    }
}

/// 2025-03-10 at the given hour, UTC.
pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
}

pub async fn seed_user(store: &dyn Store, name: &str, is_admin: bool) -> User {
    store
        .insert_user(NewUser {
            name: name.to_string(),
            email: format!("{}@lab.test", name.to_lowercase()),
            is_admin,
            is_approved: true,
        })
        .await
        .unwrap()
}

pub async fn seed_resource(store: &dyn Store, name: &str) -> Resource {
    store
        .insert_resource(NewResource {
            name: name.to_string(),
            description: format!("{name} in lab 2"),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub fn auth_settings() -> AuthSettings {
    AuthSettings::new(TEST_SECRET.to_string(), chrono::Duration::hours(1), false)
}

/// Engine over a fresh memory store, recording notifications.
pub fn engine_with(
    settings: BookingSettings,
) -> (
    Arc<MemoryStore>,
    AdmissionEngine,
    mpsc::UnboundedReceiver<PushMessage>,
) {
    let store = Arc::new(MemoryStore::new());
    let (notifier, receiver) = RecordingNotifier::new();
    let notifications = NotificationDispatcher::new(store.clone(), Arc::new(notifier));
    let engine = AdmissionEngine::new(store.clone(), notifications, settings);
    (store, engine, receiver)
}
