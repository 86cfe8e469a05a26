use crate::reservation::ReservationView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Who a notification is meant for. Recipients who turned push off are
/// dropped when the target is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationTarget {
    AllAdmins,
    Users(Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub target: NotificationTarget,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// What is handed to the push delivery service: one message fanned out to
/// every device token of the resolved recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(notification: Notification, tokens: Vec<String>) -> Self {
        Self {
            tokens,
            title: notification.title,
            body: notification.body,
            data: notification.data,
        }
    }
}

fn display_time(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %H:%M UTC").to_string()
}

impl Notification {
    /// Tells the admins a new request is waiting for a decision.
    pub fn reservation_requested(view: &ReservationView) -> Self {
        let reservation = &view.reservation;
        let mut data = BTreeMap::new();
        data.insert("reservationId".to_string(), reservation.id.to_string());
        data.insert("type".to_string(), "new_reservation".to_string());

        Self {
            target: NotificationTarget::AllAdmins,
            title: "New Reservation Request".to_string(),
            body: format!(
                "{} requested {} from {} to {}",
                view.requester.name,
                view.resource.name,
                display_time(reservation.start_time),
                display_time(reservation.end_time),
            ),
            data,
        }
    }

    /// Tells the requester what an admin decided.
    pub fn reservation_decided(view: &ReservationView) -> Self {
        let reservation = &view.reservation;
        let status = reservation.status.as_str();
        let mut verdict = status.to_string();
        if let Some(first) = verdict.get_mut(0..1) {
            first.make_ascii_uppercase();
        }

        let mut data = BTreeMap::new();
        data.insert("reservationId".to_string(), reservation.id.to_string());
        data.insert("type".to_string(), format!("reservation_{status}"));

        Self {
            target: NotificationTarget::Users(vec![reservation.user_id]),
            title: format!("Reservation {verdict}"),
            body: format!("Your reservation for {} has been {status}", view.resource.name),
            data,
        }
    }
}
