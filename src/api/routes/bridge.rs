use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use super::ControlState;
use crate::api::completion::ExitOnCompletion;
use crate::controller::state::StopDecision;

pub const CLOSED_MESSAGE: &str = "The Bridge has closed.";
pub const ALREADY_STOPPING_MESSAGE: &str = "Bridge is already stopping.";

/// Current configuration as a JSON dictionary.
pub async fn get_bridge(State(state): State<ControlState>) -> Response {
    let dictionary = state.controller.dictionary().await;
    match serde_json::to_string(&dictionary) {
        Ok(body) => {
            debug!(body = %body, "GET bridge");
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(format!("failed to serialize configuration: {}", e)),
        )
            .into_response(),
    }
}

/// Stop the bridge. The accepted response carries the exit trigger in its
/// body, so the process only exits after the acknowledgment is sent.
pub async fn delete_bridge(State(state): State<ControlState>) -> Response {
    info!("received DELETE request");
    state.controller.respond_to_stop(|decision| match decision {
        StopDecision::Accepted(trigger) => {
            let payload = serde_json::Value::from(CLOSED_MESSAGE).to_string();
            let body = Body::from_stream(ExitOnCompletion::new(payload, trigger));
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        StopDecision::AlreadyStopping => {
            debug!("rejecting DELETE; bridge already stopping");
            (StatusCode::BAD_REQUEST, Json(ALREADY_STOPPING_MESSAGE)).into_response()
        }
    })
}
