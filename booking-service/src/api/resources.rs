use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use shared::{Availability, ReservationView};
use tracing::info;
use uuid::Uuid;

use super::{reservations::MessageResponse, required, ApiJson, ApiPath, AppState};
use crate::auth::{AdminUser, CurrentUser};
use crate::errors::{Error, Result};
use crate::models::{NewResource, Resource, ResourceChanges};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub is_computer: Option<bool>,
    pub system_user: Option<String>,
    pub system_ip: Option<String>,
    pub system_password: Option<String>,
}

/// A resource as shown in the list: occupancy now and the next few bookings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListItem {
    #[serde(flatten)]
    pub resource: Resource,
    pub is_available: bool,
    pub current_reservation: Option<ReservationView>,
    pub future_reservations: Vec<ReservationView>,
}

#[derive(Debug, Serialize)]
pub struct ResourceDetail {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(flatten)]
    pub availability: Availability,
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound { entity: "Resource", id }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<Option<String>> {
    match value {
        Some(v) if v.trim().is_empty() => Err(Error::validation(field, format!("{field} cannot be empty"))),
        Some(v) => Ok(Some(v.trim().to_string())),
        None => Ok(None),
    }
}

pub async fn list(State(state): State<AppState>, _user: CurrentUser) -> Result<Json<Vec<ResourceListItem>>> {
    let resources = state.store.list_resources().await?;
    let now = Utc::now();
    let window = state.engine.settings().list_window;

    let availabilities = try_join_all(
        resources
            .iter()
            .map(|resource| state.engine.availability_of(resource.id, now, &window)),
    )
    .await?;

    let items = resources
        .into_iter()
        .zip(availabilities)
        .map(|(resource, availability)| ResourceListItem {
            resource,
            is_available: availability.is_available,
            current_reservation: availability.current_reservation,
            future_reservations: availability.future_reservations,
        })
        .collect();

    Ok(Json(items))
}

pub async fn get_one(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ResourceDetail>> {
    let resource = state.store.find_resource(id).await?.ok_or_else(|| not_found(id))?;
    let window = state.engine.settings().detail_window;
    let availability = state.engine.availability_of(id, Utc::now(), &window).await?;

    Ok(Json(ResourceDetail { resource, availability }))
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<ResourceRequest>,
) -> Result<(StatusCode, Json<Resource>)> {
    let resource = NewResource {
        name: required(&request.name, "name")?.to_string(),
        description: required(&request.description, "description")?.to_string(),
        image: request.image.filter(|v| !v.is_empty()),
        is_computer: request.is_computer.unwrap_or(false),
        system_user: request.system_user.filter(|v| !v.is_empty()),
        system_ip: request.system_ip.filter(|v| !v.is_empty()),
        system_password: request.system_password.filter(|v| !v.is_empty()),
    };

    let resource = state.store.insert_resource(resource).await?;
    info!("Resource {} created by {}", resource.id, admin.id);
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ResourceRequest>,
) -> Result<Json<Resource>> {
    let changes = ResourceChanges {
        name: non_empty(request.name, "name")?,
        description: non_empty(request.description, "description")?,
        image: request.image,
        is_computer: request.is_computer,
        system_user: request.system_user,
        system_ip: request.system_ip,
        system_password: request.system_password,
    };

    let resource = state
        .store
        .update_resource(id, changes)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(resource))
}

pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    if !state.store.delete_resource(id).await? {
        return Err(not_found(id));
    }
    info!("Resource {} and its reservations deleted by {}", id, admin.id);
    Ok(Json(MessageResponse {
        message: "Resource deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::TestApp;
    use crate::test_utils::{seed_resource, seed_user};
    use chrono::Duration;
    use serde_json::{json, Value};
    use shared::{Decision, Priority, Proposal, TimeRange};

    #[tokio::test]
    async fn admins_manage_resources() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;

        let (name, value) = app.bearer(&admin);
        let created = app
            .server
            .post("/api/resources")
            .add_header(name, value)
            .json(&json!({
                "name": "Workstation 3",
                "description": "GPU box",
                "isComputer": true,
                "systemUser": "lab",
                "systemIp": "10.0.0.3",
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created = created.json::<Value>();
        assert_eq!(created["isComputer"], true);
        assert_eq!(created["systemIp"], "10.0.0.3");
        let id = created["id"].as_str().unwrap().to_string();

        let (name, value) = app.bearer(&admin);
        let updated = app
            .server
            .put(&format!("/api/resources/{id}"))
            .add_header(name, value)
            .json(&json!({ "description": "Two GPUs", "systemIp": "" }))
            .await
            .json::<Value>();
        assert_eq!(updated["name"], "Workstation 3");
        assert_eq!(updated["description"], "Two GPUs");
        assert_eq!(updated["systemIp"], Value::Null);

        let (name, value) = app.bearer(&admin);
        app.server
            .delete(&format!("/api/resources/{id}"))
            .add_header(name, value)
            .await
            .assert_status_ok();

        let (name, value) = app.bearer(&admin);
        app.server
            .get(&format!("/api/resources/{id}"))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_admins_cannot_create() {
        let app = TestApp::new();
        let user = seed_user(app.store.as_ref(), "Ada", false).await;
        let (name, value) = app.bearer(&user);

        app.server
            .post("/api/resources")
            .add_header(name, value)
            .json(&json!({ "name": "Laser", "description": "Class 4" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_requires_name_and_description() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;
        let (name, value) = app.bearer(&admin);

        let response = app
            .server
            .post("/api/resources")
            .add_header(name, value)
            .json(&json!({ "name": "Laser" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["field"], "description");
    }

    #[tokio::test]
    async fn availability_views_differ_in_preview_length() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;
        let user = seed_user(app.store.as_ref(), "Ada", false).await;
        let resource = seed_resource(app.store.as_ref(), "Microscope").await;

        // One booking running right now and five upcoming ones.
        let now = Utc::now();
        let mut slots = vec![(now - Duration::minutes(30), now + Duration::minutes(30))];
        for day in 1..=5 {
            slots.push((now + Duration::days(day), now + Duration::days(day) + Duration::hours(1)));
        }
        for (start, end) in slots {
            let view = app
                .engine
                .propose(Proposal {
                    resource_id: resource.id,
                    requester_id: user.id,
                    range: TimeRange::new(start, end).unwrap(),
                    reason: "beamtime".to_string(),
                    priority: Priority::Normal,
                })
                .await
                .unwrap();
            app.engine
                .decide(view.reservation.id, Decision::Approved, &admin.actor())
                .await
                .unwrap();
        }

        let (name, value) = app.bearer(&user);
        let list = app
            .server
            .get("/api/resources")
            .add_header(name, value)
            .await
            .json::<Vec<Value>>();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["isAvailable"], false);
        assert!(list[0]["currentReservation"].is_object());
        assert_eq!(list[0]["futureReservations"].as_array().unwrap().len(), 3);

        let (name, value) = app.bearer(&user);
        let detail = app
            .server
            .get(&format!("/api/resources/{}", resource.id))
            .add_header(name, value)
            .await
            .json::<Value>();
        assert_eq!(detail["futureReservations"].as_array().unwrap().len(), 5);
        assert_eq!(detail["pastReservations"].as_array().unwrap().len(), 0);
        assert_eq!(detail["name"], "Microscope");
    }

    #[tokio::test]
    async fn deleting_a_resource_removes_its_reservations() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;
        let user = seed_user(app.store.as_ref(), "Ada", false).await;
        let resource = seed_resource(app.store.as_ref(), "Microscope").await;

        let (name, value) = app.bearer(&user);
        app.server
            .post("/api/reservations")
            .add_header(name, value)
            .json(&json!({
                "resourceId": resource.id,
                "start": "2025-03-10T10:00:00Z",
                "end": "2025-03-10T11:00:00Z",
                "reason": "imaging",
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let (name, value) = app.bearer(&admin);
        app.server
            .delete(&format!("/api/resources/{}", resource.id))
            .add_header(name, value)
            .await
            .assert_status_ok();

        let (name, value) = app.bearer(&admin);
        let remaining = app
            .server
            .get("/api/reservations")
            .add_header(name, value)
            .await
            .json::<Vec<Value>>();
        assert!(remaining.is_empty());
    }
}
