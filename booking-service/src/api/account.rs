use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use super::{required, ApiJson, AppState};
use crate::auth::{clear_cookie, CurrentUser, MaybeUser};
use crate::errors::{Error, Result};
use crate::models::{NotificationPreferences, User, UserChanges};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub push: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    pub notification_preferences: NotificationPreferences,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: Option<String>,
}

pub async fn me(MaybeUser(user): MaybeUser) -> Json<MeResponse> {
    Json(MeResponse { user })
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_cookie(&state.auth))],
        Json(serde_json::json!({ "success": true })),
    )
}

/// Only absolute http(s) URLs are accepted as profile pictures.
fn profile_picture_url(raw: &str) -> Result<String> {
    let url = url::Url::parse(raw).map_err(|_| Error::validation("profilePicture", "Invalid profile picture URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        _ => Err(Error::validation("profilePicture", "Invalid profile picture URL")),
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<ProfileRequest>,
) -> Result<Json<MeResponse>> {
    let picture = required(&request.profile_picture, "profilePicture")?;
    let changes = UserChanges {
        profile_picture: Some(profile_picture_url(picture)?),
        ..Default::default()
    };

    let updated = state.store.update_user(user.id, changes).await?.ok_or(Error::NotFound {
        entity: "User",
        id: user.id,
    })?;
    Ok(Json(MeResponse { user: Some(updated) }))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<PreferencesRequest>,
) -> Result<Json<PreferencesResponse>> {
    let push = request
        .push
        .ok_or_else(|| Error::validation("push", "push must be true or false"))?;
    state.store.set_push_enabled(user.id, push).await?;

    Ok(Json(PreferencesResponse {
        notification_preferences: NotificationPreferences { push },
    }))
}

pub async fn register_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<TokenRequest>,
) -> Result<StatusCode> {
    let token = required(&request.token, "token")?;
    state.store.add_push_token(user.id, token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unregister_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<TokenRequest>,
) -> Result<StatusCode> {
    let token = required(&request.token, "token")?;
    state.store.remove_push_token(user.id, token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::tests::TestApp;
    use crate::auth::issue_token;
    use crate::store::Store;
    use crate::test_utils::seed_user;
    use axum::http::{header, HeaderValue, StatusCode};
    use serde_json::{json, Value};
    use shared::NotificationTarget;

    #[tokio::test]
    async fn me_reads_the_session_cookie() {
        let app = TestApp::new();
        let user = seed_user(app.store.as_ref(), "Ada", false).await;
        let token = issue_token(&user, &app.auth).unwrap();

        let body = app
            .server
            .get("/api/auth/me")
            .add_header(
                header::COOKIE,
                HeaderValue::from_str(&format!("auth_token={token}")).unwrap(),
            )
            .await
            .json::<Value>();
        assert_eq!(body["user"]["email"], "ada@lab.test");
    }

    #[tokio::test]
    async fn me_is_null_for_anonymous_or_stale_sessions() {
        let app = TestApp::new();

        let body = app.server.get("/api/auth/me").await.json::<Value>();
        assert_eq!(body, json!({ "user": null }));

        let body = app
            .server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer garbage"))
            .await
            .json::<Value>();
        assert_eq!(body["user"], Value::Null);
    }

    #[tokio::test]
    async fn logout_expires_the_cookie() {
        let app = TestApp::new();
        let response = app.server.post("/api/auth/logout").await;
        response.assert_status_ok();
        let cookie = response.header(header::SET_COOKIE);
        assert!(cookie.to_str().unwrap().starts_with("auth_token=;"));
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn profile_picture_is_set_from_a_url() {
        let app = TestApp::new();
        let user = seed_user(app.store.as_ref(), "Ada", false).await;

        let (name, value) = app.bearer(&user);
        let response = app
            .server
            .put("/api/auth/update-profile")
            .add_header(name, value)
            .json(&json!({ "profilePicture": "https://cdn.lab.test/ada.png" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["user"]["profilePicture"], "https://cdn.lab.test/ada.png");

        let stored = app.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.profile_picture.as_deref(), Some("https://cdn.lab.test/ada.png"));
    }

    #[tokio::test]
    async fn profile_picture_must_be_a_web_url() {
        let app = TestApp::new();
        let user = seed_user(app.store.as_ref(), "Ada", false).await;

        for body in [
            json!({}),
            json!({ "profilePicture": "  " }),
            json!({ "profilePicture": "ada.png" }),
            json!({ "profilePicture": "javascript:alert(1)" }),
        ] {
            let (name, value) = app.bearer(&user);
            let response = app
                .server
                .put("/api/auth/update-profile")
                .add_header(name, value)
                .json(&body)
                .await;
            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json::<Value>()["field"], "profilePicture");
        }

        let stored = app.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.profile_picture, None);
    }

    #[tokio::test]
    async fn push_preferences_and_tokens() {
        let app = TestApp::new();
        let user = seed_user(app.store.as_ref(), "Ada", false).await;
        let target = NotificationTarget::Users(vec![user.id]);

        let (name, value) = app.bearer(&user);
        app.server
            .post("/api/notifications/tokens")
            .add_header(name, value)
            .json(&json!({ "token": "ada-phone" }))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(app.store.push_tokens_for(&target).await.unwrap(), vec!["ada-phone".to_string()]);

        let (name, value) = app.bearer(&user);
        let body = app
            .server
            .put("/api/notifications/preferences")
            .add_header(name, value)
            .json(&json!({ "push": false }))
            .await
            .json::<Value>();
        assert_eq!(body["notificationPreferences"]["push"], false);
        assert!(app.store.push_tokens_for(&target).await.unwrap().is_empty());

        let (name, value) = app.bearer(&user);
        app.server
            .delete("/api/notifications/tokens")
            .add_header(name, value)
            .json(&json!({ "token": "ada-phone" }))
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
}
