use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use shared::{CancelDenied, RangeError};
use thiserror::Error as ThisError;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// A request field is missing or malformed
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The target exists but is not in a state that allows the operation
    #[error("{0}")]
    InvalidState(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Another approved reservation already holds the slot, or a unique value is taken
    #[error("{message}")]
    Conflict {
        message: String,
        conflicting_id: Option<Uuid>,
    },

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_id: Option<Uuid>,
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Store(StoreError::Duplicate(_) | StoreError::OverlapConstraint) => StatusCode::CONFLICT,
            Error::Store(StoreError::MissingReference(_)) => StatusCode::BAD_REQUEST,
            Error::Internal(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client; store internals never leak.
    pub fn user_message(&self) -> String {
        match self {
            Error::Store(StoreError::Duplicate(constraint)) if constraint.contains("email") => {
                "An account with this email address already exists".to_string()
            }
            Error::Store(StoreError::Duplicate(_)) => "Resource already exists".to_string(),
            Error::Store(StoreError::OverlapConstraint) => {
                "Time slot conflicts with an already approved reservation".to_string()
            }
            Error::Store(StoreError::MissingReference(_)) => "Invalid reference to related resource".to_string(),
            Error::Internal(_) | Error::Store(_) => "Internal server error".to_string(),
            Error::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<CancelDenied> for Error {
    fn from(err: CancelDenied) -> Self {
        match err {
            CancelDenied::NotOwner => Error::Forbidden(err.to_string()),
            CancelDenied::NotPending(_) => Error::InvalidState(err.to_string()),
        }
    }
}

impl From<RangeError> for Error {
    fn from(err: RangeError) -> Self {
        Error::validation("end", err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match status {
            s if s.is_server_error() => tracing::error!("Internal service error: {:#}", self),
            StatusCode::CONFLICT => tracing::warn!("Conflict error: {}", self),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => tracing::info!("Authorization error: {}", self),
            _ => tracing::debug!("Client error: {}", self),
        }

        let body = ErrorResponse {
            error: self.user_message(),
            field: match &self {
                Error::Validation { field, .. } => Some(field.clone()),
                _ => None,
            },
            conflicting_id: match &self {
                Error::Conflict { conflicting_id, .. } => *conflicting_id,
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ReservationStatus;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(Error::validation("reason", "required").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Forbidden("no".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::NotFound {
                entity: "Reservation",
                id: Uuid::nil()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::Store(StoreError::OverlapConstraint).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            Error::Store(StoreError::Pool("timed out".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn cancel_denials_map_to_forbidden_and_state() {
        assert_eq!(Error::from(CancelDenied::NotOwner).status_code(), StatusCode::FORBIDDEN);
        let err = Error::from(CancelDenied::NotPending(ReservationStatus::Approved));
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_details_stay_private() {
        let err = Error::Store(StoreError::Pool("connection refused to 10.0.0.3".into()));
        assert_eq!(err.user_message(), "Internal server error");
        let err = Error::Store(StoreError::Duplicate("users_email_key".into()));
        assert_eq!(err.user_message(), "An account with this email address already exists");
    }
}
