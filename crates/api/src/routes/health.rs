use crate::{AppState, HealthCheck, ServiceHealth};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use tracing::{debug, warn};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

async fn health_check() -> Json<serde_json::Value> {
    debug!("Health check requested");
    Json(json!({
        "status": "ok",
        "message": "Service is running"
    }))
}

/// Ready once the database answers.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthCheck>) {
    debug!("Readiness check requested");

    let database_ready = match state.core.db.health_check().await {
        Ok(health) => health.is_healthy,
        Err(e) => {
            warn!("Database readiness check failed: {}", e);
            false
        }
    };

    let voice = state.voice.health_check();
    let voice_status = if voice.chat_available { "configured" } else { "unconfigured" };

    let health = HealthCheck {
        status: if database_ready { "ready" } else { "not_ready" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealth {
            database: if database_ready { "healthy" } else { "unhealthy" }.to_string(),
            voice: voice_status.to_string(),
        },
    };

    let status = if database_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn liveness_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now()
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app, call, test_state};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_health_check() {
        let app = app(&test_state().await);
        let (status, body) = call(&app, Method::GET, "/api/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Service is running");
    }

    #[tokio::test]
    async fn test_readiness_check() {
        let app = app(&test_state().await);
        let (status, body) = call(&app, Method::GET, "/api/health/ready", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["services"]["database"], "healthy");
        assert_eq!(body["services"]["voice"], "unconfigured");
    }

    #[tokio::test]
    async fn test_liveness_check() {
        let app = app(&test_state().await);
        let (status, body) = call(&app, Method::GET, "/api/health/live", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "alive");
    }
}
