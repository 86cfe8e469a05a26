use axum::{
    extract::{Query, State},
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

use super::{parse_time, parse_uuid, required, ApiJson, ApiPath, AppState};
use crate::auth::{AdminUser, CurrentUser};
use crate::errors::{Error, Result};
use crate::models::User;
use crate::store::ReservationFilter;

pub const PENDING_COUNT_HEADER: HeaderName = HeaderName::from_static("x-pending-count");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub resource_id: Option<String>,
    pub requester_id: Option<String>,
    #[serde(alias = "startTime")]
    pub start: Option<String>,
    #[serde(alias = "endTime")]
    pub end: Option<String>,
    pub reason: Option<String>,
    pub priority: Option<String>,
}

impl CreateReservationRequest {
    /// Validates the body for `caller`. Only admins may book for someone else.
    pub fn into_proposal(self, caller: &User) -> Result<Proposal> {
        let resource_id = parse_uuid(required(&self.resource_id, "resourceId")?, "resourceId")?;

        let requester_id = match self.requester_id.as_deref().map(str::trim) {
            None | Some("") => caller.id,
            Some(raw) => parse_uuid(raw, "requesterId")?,
        };
        if requester_id != caller.id && !caller.is_admin {
            return Err(Error::Forbidden("Only admins can book on behalf of another user".to_string()));
        }

        let start = parse_time(required(&self.start, "start")?, "start")?;
        let end = parse_time(required(&self.end, "end")?, "end")?;
        let range = TimeRange::new(start, end)?;

        let reason = required(&self.reason, "reason")?.to_string();

        let priority = match self.priority.as_deref().map(str::trim) {
            None | Some("") => Priority::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e: UnknownVariant| Error::validation("priority", e.to_string()))?,
        };

        Ok(Proposal {
            resource_id,
            requester_id,
            range,
            reason,
            priority,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    #[serde(alias = "status")]
    pub decision: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReservationView>>> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<ReservationStatus>()
                .map_err(|e| Error::validation("status", e.to_string()))?,
        ),
    };
    let resource_id = match query.resource_id.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(parse_uuid(raw, "resourceId")?),
    };
    // Non-admins only ever see their own reservations.
    let user_id = if user.is_admin {
        match query.user_id.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(parse_uuid(raw, "userId")?),
        }
    } else {
        Some(user.id)
    };

    let filter = ReservationFilter {
        user_id,
        resource_id,
        status,
    };
    Ok(Json(state.store.list_reservations(&filter).await?))
}

pub async fn pending_count(State(state): State<AppState>, _admin: AdminUser) -> Result<impl IntoResponse> {
    let count = state.store.count_pending().await?;
    Ok((StatusCode::OK, [(PENDING_COUNT_HEADER, count.to_string())]))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationView>)> {
    let proposal = request.into_proposal(&user)?;
    let view = state.engine.propose(proposal).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_one(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ReservationView>> {
    let view = state
        .store
        .find_reservation_view(id)
        .await?
        .ok_or(Error::NotFound {
            entity: "Reservation",
            id,
        })?;
    if !user.actor().can_view(&view.reservation) {
        return Err(Error::Forbidden("Not your reservation".to_string()));
    }
    Ok(Json(view))
}

pub async fn decide(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<DecideRequest>,
) -> Result<Json<ReservationView>> {
    let decision: Decision = required(&request.decision, "decision")?
        .parse()
        .map_err(|_| Error::validation("decision", "decision must be 'approved' or 'rejected'"))?;

    let view = state.engine.decide(id, decision, &user.actor()).await?;
    Ok(Json(view))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    state.engine.cancel(id, &user.actor()).await?;
    Ok(Json(MessageResponse {
        message: "Reservation cancelled".to_string(),
    }))
}
