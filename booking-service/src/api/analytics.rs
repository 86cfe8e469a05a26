use axum::{extract::State, response::Json};
use shared::UsageReport;

use super::AppState;
use crate::auth::AdminUser;
use crate::errors::Result;

pub async fn report(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<UsageReport>> {
    let spans = state.store.usage_spans().await?;
    Ok(Json(UsageReport::from_spans(&spans)))
}
