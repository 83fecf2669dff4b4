use crate::{
    create_error_response, create_success_response,
    error::{ApiError, ApiResult},
    extract::JsonBody,
    AppState,
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::error;
use waypoint_common::WaypointError;
use waypoint_core::location::LocationRequest;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/context", post(location_context))
        .route("/health", get(location_health))
}

/// Bad coordinates are a 400. Any other failure is reported in the
/// envelope with a 200 so the client can still render the map.
async fn location_context(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LocationRequest>,
) -> ApiResult<Response> {
    match state.core.location.get_context(&request).await {
        Ok(context) => Ok(create_success_response(context).into_response()),
        Err(e @ WaypointError::Validation(_)) => Err(ApiError::from(e)),
        Err(e) => {
            error!("Location context failed: {}", e);
            Ok(create_error_response(e.to_string()).into_response())
        }
    }
}

async fn location_health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "location"}))
}
