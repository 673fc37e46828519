//! Service status handler.

use axum::{Json, extract::State};
use std::sync::Arc;

use crate::service::ServiceStatus;

use super::super::state::AppState;

/// GET /status - current print service snapshot.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    Json(state.service.status())
}
