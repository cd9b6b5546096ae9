pub mod bridge;
pub mod config;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::controller::Controller;

#[derive(Clone)]
pub struct ControlState {
    pub controller: Arc<Controller>,
}

pub fn api_router(state: ControlState) -> Router {
    Router::new()
        .route(
            "/bridge",
            get(bridge::get_bridge).delete(bridge::delete_bridge),
        )
        .route("/config", post(config::update_config))
        .layer(middleware::from_fn_with_state(state.clone(), track_activity))
        .with_state(state)
}

/// Every control request counts as activity for the idle watchdog.
async fn track_activity(
    State(state): State<ControlState>,
    request: Request,
    next: Next,
) -> Response {
    state.controller.activity().touch();
    next.run(request).await
}
