use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use shared::*;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub push: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_approved: bool,
    pub profile_picture: Option<String>,
    pub notification_preferences: NotificationPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id,
            is_admin: self.is_admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub is_approved: Option<bool>,
    pub profile_picture: Option<String>,
}

/// A bookable asset. The computer access fields are stored and returned
/// verbatim; nothing in the service interprets them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub is_computer: bool,
    pub system_user: Option<String>,
    pub system_ip: Option<String>,
    pub system_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewResource {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub is_computer: bool,
    pub system_user: Option<String>,
    pub system_ip: Option<String>,
    pub system_password: Option<String>,
}

/// Partial update. For the optional text fields an empty string clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub is_computer: Option<bool>,
    pub system_user: Option<String>,
    pub system_ip: Option<String>,
    pub system_password: Option<String>,
}

/// `Some("")` means "clear", `None` means "leave as is".
pub fn apply_optional(current: &mut Option<String>, change: Option<String>) {
    if let Some(value) = change {
        *current = if value.is_empty() { None } else { Some(value) };
    }
}

impl ResourceChanges {
    pub fn apply(self, resource: &mut Resource) {
        if let Some(name) = self.name {
            resource.name = name;
        }
        if let Some(description) = self.description {
            resource.description = description;
        }
        if let Some(is_computer) = self.is_computer {
            resource.is_computer = is_computer;
        }
        apply_optional(&mut resource.image, self.image);
        apply_optional(&mut resource.system_user, self.system_user);
        apply_optional(&mut resource.system_ip, self.system_ip);
        apply_optional(&mut resource.system_password, self.system_password);
    }
}

impl UserChanges {
    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(is_admin) = self.is_admin {
            user.is_admin = is_admin;
        }
        if let Some(is_approved) = self.is_approved {
            user.is_approved = is_approved;
        }
        apply_optional(&mut user.profile_picture, self.profile_picture);
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct DbReservation {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub priority: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::resources, treat_none_as_null = true)]
pub struct DbResource {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub is_computer: bool,
    pub system_username: Option<String>,
    pub system_ip: Option<String>,
    pub system_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::users, treat_none_as_null = true)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_approved: bool,
    pub push_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::push_tokens)]
pub struct NewPushToken<'a> {
    pub user_id: Uuid,
    pub token: &'a str,
}

impl From<&Reservation> for DbReservation {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            resource_id: reservation.resource_id,
            user_id: reservation.user_id,
            start_time: reservation.start_time,
            end_time: reservation.end_time,
            status: reservation.status.as_str().to_string(),
            priority: reservation.priority.as_str().to_string(),
            reason: reservation.reason.clone(),
            created_at: reservation.created_at,
            updated_at: reservation.updated_at,
        }
    }
}

impl TryFrom<DbReservation> for Reservation {
    type Error = StoreError;

    fn try_from(row: DbReservation) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            resource_id: row.resource_id,
            user_id: row.user_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            priority: row.priority.parse()?,
            reason: row.reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A reservation row joined with its requester's and resource's display fields.
pub type DbReservationRow = (DbReservation, String, String, String);

pub fn reservation_view(row: DbReservationRow) -> Result<ReservationView, StoreError> {
    let (reservation, user_name, user_email, resource_name) = row;
    let reservation = Reservation::try_from(reservation)?;
    Ok(ReservationView {
        requester: UserSummary {
            id: reservation.user_id,
            name: user_name,
            email: user_email,
        },
        resource: ResourceSummary {
            id: reservation.resource_id,
            name: resource_name,
        },
        reservation,
    })
}

impl From<DbResource> for Resource {
    fn from(row: DbResource) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            image: row.image,
            is_computer: row.is_computer,
            system_user: row.system_username,
            system_ip: row.system_ip,
            system_password: row.system_password,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<Resource> for DbResource {
    fn from(resource: Resource) -> Self {
        Self {
            id: resource.id,
            name: resource.name,
            description: resource.description,
            image: resource.image,
            is_computer: resource.is_computer,
            system_username: resource.system_user,
            system_ip: resource.system_ip,
            system_password: resource.system_password,
            created_at: resource.created_at,
            updated_at: resource.updated_at,
        }
    }
}

impl From<DbUser> for User {
    fn from(row: DbUser) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            is_admin: row.is_admin,
            is_approved: row.is_approved,
            profile_picture: row.profile_picture,
            notification_preferences: NotificationPreferences { push: row.push_enabled },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<User> for DbUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
            is_approved: user.is_approved,
            push_enabled: user.notification_preferences.push,
            created_at: user.created_at,
            updated_at: user.updated_at,
            profile_picture: user.profile_picture,
        }
    }
}

impl NewUser {
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            is_admin: self.is_admin,
            is_approved: self.is_approved,
            profile_picture: None,
            notification_preferences: NotificationPreferences { push: true },
            created_at: now,
            updated_at: now,
        }
    }
}

impl NewResource {
    pub fn into_resource(self, now: DateTime<Utc>) -> Resource {
        Resource {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            image: self.image,
            is_computer: self.is_computer,
            system_user: self.system_user,
            system_ip: self.system_ip,
            system_password: self.system_password,
            created_at: now,
            updated_at: now,
        }
    }
}
