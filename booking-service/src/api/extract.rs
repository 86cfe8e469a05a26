//! Request extractors whose rejections are [`Error`]s, so malformed bodies and
//! path ids get the same JSON error shape as every other validation failure.

use axum::{
    body::Bytes,
    extract::{path::ErrorKind, rejection::PathRejection, FromRequest, FromRequestParts, Path, Request},
    http::{header, request::Parts, HeaderMap},
};
use serde::de::DeserializeOwned;

use crate::errors::{Error, Result};

/// JSON body. A value of the wrong type is reported against its field path.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        if !has_json_content_type(req.headers()) {
            return Err(Error::validation("body", "Expected a JSON request body"));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| Error::validation("body", rejection.body_text()))?;

        let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
        serde_path_to_error::deserialize(deserializer)
            .map(ApiJson)
            .map_err(|err| {
                let path = err.path().to_string();
                let inner = err.into_inner();
                match inner.classify() {
                    serde_json::error::Category::Data if path != "." => Error::validation(path, inner.to_string()),
                    _ => Error::validation("body", format!("Malformed JSON body: {inner}")),
                }
            })
    }
}

/// Path parameters; every route here names its single parameter `id`.
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        match &rejection {
            PathRejection::FailedToDeserializePathParams(err) => {
                let field = match err.kind() {
                    ErrorKind::ParseErrorAtKey { key, .. } | ErrorKind::InvalidUtf8InPathParam { key } => key.clone(),
                    _ => "id".to_string(),
                };
                Error::validation(field, rejection.body_text())
            }
            _ => Error::Internal(rejection.body_text()),
        }
    }
}

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}
