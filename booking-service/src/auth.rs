//! Session tokens and the extractors that turn them into users.
//!
//! A request is authenticated by an HS256 JWT carried either in the session
//! cookie or in an `Authorization: Bearer` header. The token only names the
//! user; flags are always reloaded from the store so revoking approval or
//! admin rights takes effect immediately.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::{Error, Result};
use crate::models::User;

pub const DEFAULT_COOKIE_NAME: &str = "auth_token";

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_lifetime: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl AuthSettings {
    pub fn new(jwt_secret: String, token_lifetime: Duration, cookie_secure: bool) -> Self {
        Self {
            jwt_secret,
            token_lifetime,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_secure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

impl SessionClaims {
    pub fn new(user: &User, settings: &AuthSettings) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id,
            email: user.email.clone(),
            is_admin: user.is_admin,
            exp: (now + settings.token_lifetime).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn issue_token(user: &User, settings: &AuthSettings) -> Result<String> {
    let claims = SessionClaims::new(user, settings);
    let key = EncodingKey::from_secret(settings.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal(format!("create JWT: {e}")))
}

pub fn verify_token(token: &str, settings: &AuthSettings) -> Result<SessionClaims> {
    let key = DecodingKey::from_secret(settings.jwt_secret.as_bytes());

    let data = decode::<SessionClaims>(token, &key, &Validation::default()).map_err(|e| match e.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => {
            debug!("Rejected session token: {}", e);
            Error::Unauthenticated
        }
        _ => Error::Internal(format!("JWT verification: {e}")),
    })?;

    Ok(data.claims)
}

/// Bearer header first, then the session cookie.
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == cookie_name && !value.is_empty()).then(|| value.to_string())
    })
}

pub fn clear_cookie(settings: &AuthSettings) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        settings.cookie_name,
        if settings.cookie_secure { "; Secure" } else { "" }
    )
}

/// `Ok(None)` when the request carries no token at all.
async fn user_from_token(parts: &Parts, state: &AppState) -> Result<Option<User>> {
    let Some(token) = token_from_headers(&parts.headers, &state.auth.cookie_name) else {
        return Ok(None);
    };
    let claims = verify_token(&token, &state.auth)?;
    let user = state.store.find_user(claims.sub).await?.ok_or(Error::Unauthenticated)?;
    Ok(Some(user))
}

/// An authenticated, approved user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = user_from_token(parts, state).await?.ok_or(Error::Unauthenticated)?;
        if !user.is_approved {
            return Err(Error::Forbidden("Account is awaiting approval".to_string()));
        }
        Ok(CurrentUser(user))
    }
}

/// An authenticated, approved admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(Error::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// Whoever the token names, approved or not; `None` for anonymous or stale sessions.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match user_from_token(parts, state).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(Error::Unauthenticated) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}
