//! Persistence for users, resources and reservations.
//!
//! The admission engine only talks to [`Store`], so it runs unchanged against
//! Postgres in production and against [`MemoryStore`] in tests or local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use shared::*;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewResource, NewUser, Resource, ResourceChanges, User, UserChanges};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Name of the exclusion constraint that keeps approved reservations of one
/// resource from overlapping.
pub const APPROVED_OVERLAP_CONSTRAINT: &str = "reservations_no_approved_overlap";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("duplicate value violates {0}")]
    Duplicate(String),

    #[error("reference to missing row: {0}")]
    MissingReference(String),

    #[error("approved reservations would overlap")]
    OverlapConstraint,

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match &err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Duplicate(info.constraint_name().unwrap_or("unique constraint").to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                StoreError::MissingReference(info.constraint_name().unwrap_or("foreign key").to_string())
            }
            DieselError::DatabaseError(_, info) if info.constraint_name() == Some(APPROVED_OVERLAP_CONSTRAINT) => {
                StoreError::OverlapConstraint
            }
            _ => StoreError::Database(err),
        }
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for StoreError {
    fn from(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        StoreError::Pool(err.to_string())
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of the atomic approve-if-free write.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Approved(Reservation),
    Conflict { conflicting: Reservation },
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationFilter {
    pub user_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    pub status: Option<ReservationStatus>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_reservation(&self, reservation: &Reservation) -> StoreResult<()>;

    async fn find_reservation(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    async fn find_reservation_view(&self, id: Uuid) -> StoreResult<Option<ReservationView>>;

    /// Matching reservations with display fields, newest first.
    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<ReservationView>>;

    async fn find_approved_overlap(&self, resource_id: Uuid, range: &TimeRange) -> StoreResult<Option<Reservation>>;

    /// Sets the reservation to approved unless another approved reservation on
    /// the same resource overlaps it.
    ///
    /// The check and the write happen atomically with respect to every other
    /// approval on that resource: of two concurrent calls for overlapping
    /// reservations, at most one returns [`ApprovalOutcome::Approved`].
    async fn approve_reservation(&self, id: Uuid) -> StoreResult<ApprovalOutcome>;

    async fn set_reservation_status(&self, id: Uuid, status: ReservationStatus) -> StoreResult<Option<Reservation>>;

    async fn delete_reservation(&self, id: Uuid) -> StoreResult<bool>;

    async fn count_pending(&self) -> StoreResult<i64>;

    /// Approved reservations of a resource whose end is at or after `earliest_end`.
    async fn approved_ending_after(
        &self,
        resource_id: Uuid,
        earliest_end: DateTime<Utc>,
    ) -> StoreResult<Vec<ReservationView>>;

    async fn usage_spans(&self) -> StoreResult<Vec<UsageSpan>>;

    async fn insert_resource(&self, resource: NewResource) -> StoreResult<Resource>;

    async fn find_resource(&self, id: Uuid) -> StoreResult<Option<Resource>>;

    async fn list_resources(&self) -> StoreResult<Vec<Resource>>;

    async fn update_resource(&self, id: Uuid, changes: ResourceChanges) -> StoreResult<Option<Resource>>;

    /// Removes the resource and every reservation referencing it.
    async fn delete_resource(&self, id: Uuid) -> StoreResult<bool>;

    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>>;

    /// Removes the user together with their reservations and push tokens.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    async fn set_push_enabled(&self, user_id: Uuid, enabled: bool) -> StoreResult<bool>;

    async fn add_push_token(&self, user_id: Uuid, token: &str) -> StoreResult<()>;

    async fn remove_push_token(&self, user_id: Uuid, token: &str) -> StoreResult<()>;

    /// Device tokens of every targeted user who has push enabled.
    async fn push_tokens_for(&self, target: &NotificationTarget) -> StoreResult<Vec<String>>;
}
