use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::*;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ApprovalOutcome, ReservationFilter, Store, StoreError, StoreResult};
use crate::models::*;

const EMAIL_UNIQUE: &str = "users_email_key";

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    resources: HashMap<Uuid, Resource>,
    reservations: HashMap<Uuid, Reservation>,
    push_tokens: HashMap<Uuid, BTreeSet<String>>,
}

impl Tables {
    fn view(&self, reservation: &Reservation) -> StoreResult<ReservationView> {
        let user = self
            .users
            .get(&reservation.user_id)
            .ok_or_else(|| StoreError::MissingReference(format!("user {}", reservation.user_id)))?;
        let resource = self
            .resources
            .get(&reservation.resource_id)
            .ok_or_else(|| StoreError::MissingReference(format!("resource {}", reservation.resource_id)))?;

        Ok(ReservationView {
            reservation: reservation.clone(),
            requester: UserSummary {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
            },
            resource: ResourceSummary {
                id: resource.id,
                name: resource.name.clone(),
            },
        })
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|user| user.email == email && Some(user.id) != except)
    }
}

/// Keeps everything in process memory behind one lock.
///
/// Every write takes the single write guard, which gives approvals the same
/// per-resource atomicity the Postgres store gets from row locks.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.resources.contains_key(&reservation.resource_id) {
            return Err(StoreError::MissingReference(format!("resource {}", reservation.resource_id)));
        }
        if !tables.users.contains_key(&reservation.user_id) {
            return Err(StoreError::MissingReference(format!("user {}", reservation.user_id)));
        }
        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables.reservations.get(&id).cloned())
    }

    async fn find_reservation_view(&self, id: Uuid) -> StoreResult<Option<ReservationView>> {
        let tables = self.tables.read().await;
        tables.reservations.get(&id).map(|r| tables.view(r)).transpose()
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<ReservationView>> {
        let tables = self.tables.read().await;

        let mut matching: Vec<&Reservation> = tables
            .reservations
            .values()
            .filter(|r| filter.user_id.map_or(true, |id| r.user_id == id))
            .filter(|r| filter.resource_id.map_or(true, |id| r.resource_id == id))
            .filter(|r| filter.status.map_or(true, |status| r.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        matching.into_iter().map(|r| tables.view(r)).collect()
    }

    async fn find_approved_overlap(&self, resource_id: Uuid, range: &TimeRange) -> StoreResult<Option<Reservation>> {
        let tables = self.tables.read().await;
        Ok(find_conflict_in_range(resource_id, range, None, tables.reservations.values()).cloned())
    }

    async fn approve_reservation(&self, id: Uuid) -> StoreResult<ApprovalOutcome> {
        let mut tables = self.tables.write().await;

        let Some(target) = tables.reservations.get(&id) else {
            return Ok(ApprovalOutcome::NotFound);
        };
        if let Some(conflicting) = find_conflict(target, tables.reservations.values()) {
            return Ok(ApprovalOutcome::Conflict {
                conflicting: conflicting.clone(),
            });
        }

        let Some(target) = tables.reservations.get_mut(&id) else {
            return Ok(ApprovalOutcome::NotFound);
        };
        target.status = ReservationStatus::Approved;
        target.updated_at = Utc::now();
        Ok(ApprovalOutcome::Approved(target.clone()))
    }

    async fn set_reservation_status(&self, id: Uuid, status: ReservationStatus) -> StoreResult<Option<Reservation>> {
        let mut tables = self.tables.write().await;
        Ok(tables.reservations.get_mut(&id).map(|reservation| {
            reservation.status = status;
            reservation.updated_at = Utc::now();
            reservation.clone()
        }))
    }

    async fn delete_reservation(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.reservations.remove(&id).is_some())
    }

    async fn count_pending(&self) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending)
            .count();
        Ok(count as i64)
    }

    async fn approved_ending_after(
        &self,
        resource_id: Uuid,
        earliest_end: DateTime<Utc>,
    ) -> StoreResult<Vec<ReservationView>> {
        let tables = self.tables.read().await;

        let mut matching: Vec<&Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.resource_id == resource_id && r.is_approved() && r.end_time >= earliest_end)
            .collect();
        matching.sort_by_key(|r| r.start_time);

        matching.into_iter().map(|r| tables.view(r)).collect()
    }

    async fn usage_spans(&self) -> StoreResult<Vec<UsageSpan>> {
        let tables = self.tables.read().await;

        tables
            .reservations
            .values()
            .filter(|r| r.is_approved())
            .map(|r| {
                let view = tables.view(r)?;
                Ok(UsageSpan {
                    user_id: view.requester.id,
                    user_name: view.requester.name,
                    user_email: view.requester.email,
                    resource_id: view.resource.id,
                    resource_name: view.resource.name,
                    start_time: r.start_time,
                    end_time: r.end_time,
                })
            })
            .collect()
    }

    async fn insert_resource(&self, resource: NewResource) -> StoreResult<Resource> {
        let mut tables = self.tables.write().await;
        let resource = resource.into_resource(Utc::now());
        tables.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn find_resource(&self, id: Uuid) -> StoreResult<Option<Resource>> {
        let tables = self.tables.read().await;
        Ok(tables.resources.get(&id).cloned())
    }

    async fn list_resources(&self) -> StoreResult<Vec<Resource>> {
        let tables = self.tables.read().await;
        let mut resources: Vec<Resource> = tables.resources.values().cloned().collect();
        resources.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(resources)
    }

    async fn update_resource(&self, id: Uuid, changes: ResourceChanges) -> StoreResult<Option<Resource>> {
        let mut tables = self.tables.write().await;
        Ok(tables.resources.get_mut(&id).map(|resource| {
            changes.apply(resource);
            resource.updated_at = Utc::now();
            resource.clone()
        }))
    }

    async fn delete_resource(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.resources.remove(&id).is_none() {
            return Ok(false);
        }
        tables.reservations.retain(|_, r| r.resource_id != id);
        Ok(true)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::Duplicate(EMAIL_UNIQUE.to_string()));
        }
        let user = user.into_user(Utc::now());
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::Duplicate(EMAIL_UNIQUE.to_string()));
            }
        }
        Ok(tables.users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.reservations.retain(|_, r| r.user_id != id);
        tables.push_tokens.remove(&id);
        Ok(true)
    }

    async fn set_push_enabled(&self, user_id: Uuid, enabled: bool) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.notification_preferences.push = enabled;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn add_push_token(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference(format!("user {user_id}")));
        }
        tables.push_tokens.entry(user_id).or_default().insert(token.to_string());
        Ok(())
    }

    async fn remove_push_token(&self, user_id: Uuid, token: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(tokens) = tables.push_tokens.get_mut(&user_id) {
            tokens.remove(token);
        }
        Ok(())
    }

    async fn push_tokens_for(&self, target: &NotificationTarget) -> StoreResult<Vec<String>> {
        let tables = self.tables.read().await;

        let recipients = tables.users.values().filter(|user| {
            user.notification_preferences.push
                && match target {
                    NotificationTarget::AllAdmins => user.is_admin,
                    NotificationTarget::Users(ids) => ids.contains(&user.id),
                }
        });

        Ok(recipients
            .filter_map(|user| tables.push_tokens.get(&user.id))
            .flat_map(|tokens| tokens.iter().cloned())
            .collect())
    }
}
