use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{reservations::MessageResponse, required, ApiJson, ApiPath, AppState};
use crate::auth::AdminUser;
use crate::errors::{Error, Result};
use crate::models::{NewUser, User, UserChanges};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub is_approved: Option<bool>,
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound { entity: "User", id }
}

/// Emails are compared case-insensitively, so they are stored lowercased.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(Error::validation("email", "email must be a valid address")),
    }
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<User>>> {
    Ok(Json(state.store.list_users().await?))
}

pub async fn get_one(State(state): State<AppState>, _admin: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<User>> {
    let user = state.store.find_user(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(user))
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<UserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = NewUser {
        name: required(&request.name, "name")?.to_string(),
        email: normalize_email(required(&request.email, "email")?)?,
        is_admin: request.is_admin.unwrap_or(false),
        is_approved: request.is_approved.unwrap_or(false),
    };

    let user = state.store.insert_user(user).await?;
    info!("User {} created by {}", user.id, admin.id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UserRequest>,
) -> Result<Json<User>> {
    let name = match request.name {
        Some(name) if name.trim().is_empty() => return Err(Error::validation("name", "name cannot be empty")),
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    let changes = UserChanges {
        name,
        email: request.email.as_deref().map(normalize_email).transpose()?,
        is_admin: request.is_admin,
        is_approved: request.is_approved,
        profile_picture: None,
    };

    let user = state.store.update_user(id, changes).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(user))
}

pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    if !state.store.delete_user(id).await? {
        return Err(not_found(id));
    }
    info!("User {} and their reservations deleted by {}", id, admin.id);
    Ok(Json(MessageResponse {
        message: "User deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::TestApp;
    use crate::test_utils::seed_user;
    use serde_json::{json, Value};

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Ada@Lab.TEST ").unwrap(), "ada@lab.test");
        assert!(matches!(normalize_email("ada"), Err(Error::Validation { field, .. }) if field == "email"));
        assert!(normalize_email("@lab.test").is_err());
    }

    #[tokio::test]
    async fn admin_creates_and_approves_user() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;

        let (name, value) = app.bearer(&admin);
        let created = app
            .server
            .post("/api/users")
            .add_header(name, value)
            .json(&json!({ "name": "Grace", "email": "Grace@Lab.test" }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let created = created.json::<Value>();
        assert_eq!(created["email"], "grace@lab.test");
        assert_eq!(created["isApproved"], false);
        assert_eq!(created["notificationPreferences"]["push"], true);

        let (name, value) = app.bearer(&admin);
        let updated = app
            .server
            .put(&format!("/api/users/{}", created["id"].as_str().unwrap()))
            .add_header(name, value)
            .json(&json!({ "isApproved": true }))
            .await
            .json::<Value>();
        assert_eq!(updated["isApproved"], true);
        assert_eq!(updated["name"], "Grace");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;

        let (name, value) = app.bearer(&admin);
        let response = app
            .server
            .post("/api/users")
            .add_header(name, value)
            .json(&json!({ "name": "Root again", "email": "ROOT@lab.test" }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(
            response.json::<Value>()["error"],
            "An account with this email address already exists"
        );
    }

    #[tokio::test]
    async fn user_management_is_admin_only() {
        let app = TestApp::new();
        let user = seed_user(app.store.as_ref(), "Ada", false).await;
        let (name, value) = app.bearer(&user);

        app.server
            .get("/api/users")
            .add_header(name, value)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deleted_user_loses_access() {
        let app = TestApp::new();
        let admin = seed_user(app.store.as_ref(), "Root", true).await;
        let user = seed_user(app.store.as_ref(), "Ada", false).await;

        let (name, value) = app.bearer(&admin);
        app.server
            .delete(&format!("/api/users/{}", user.id))
            .add_header(name, value)
            .await
            .assert_status_ok();

        let (name, value) = app.bearer(&user);
        app.server
            .get("/api/reservations")
            .add_header(name, value)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
