use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

use super::ControlState;

/// Apply a partial configuration dictionary and return the resulting one.
pub async fn update_config(
    State(state): State<ControlState>,
    Json(updates): Json<BTreeMap<String, String>>,
) -> Response {
    info!(keys = updates.len(), "received configuration update");
    match state.controller.apply_configuration(&updates).await {
        Ok(dictionary) => Json(dictionary).into_response(),
        Err(e) => {
            warn!(error = %e, "configuration update refused");
            (StatusCode::BAD_REQUEST, Json(e.to_string())).into_response()
        }
    }
}
