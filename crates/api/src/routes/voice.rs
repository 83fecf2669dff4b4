use crate::{
    auth::CurrentUser,
    error::{authz_error, not_found, ApiResult},
    extract::PathParam,
    routes::MessageResponse,
    AppState,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;
use waypoint_voice::service::{VoiceStats, VoiceStatus};
use waypoint_voice::session::SessionInfo;

const SESSION_NOT_FOUND: &str = "User session not found";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(voice_status))
        .route("/test-models", get(test_models))
        .route("/models", get(list_models))
        .route("/sessions/:user_id", get(get_session).delete(clear_session))
        .route("/stats", get(voice_stats))
}

async fn voice_status(State(state): State<AppState>) -> Json<VoiceStatus> {
    Json(state.voice.v2v().status().await)
}

async fn test_models(State(state): State<AppState>) -> Json<Value> {
    let models = state.voice.v2v().test_models().await;
    Json(json!({
        "status": "success",
        "models": models,
        "message": "Model testing completed"
    }))
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let catalog = state.voice.v2v().models().await;
    Json(json!({
        "status": "success",
        "available_models": catalog.available_models,
        "configured_models": catalog.configured_models
    }))
}

fn ensure_own_session(caller_id: i64, user_id: i64) -> ApiResult<()> {
    if caller_id != user_id {
        return Err(authz_error("Access denied"));
    }
    Ok(())
}

async fn get_session(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    PathParam(user_id): PathParam<i64>,
) -> ApiResult<Json<SessionInfo>> {
    ensure_own_session(caller.id, user_id)?;
    let info = state
        .voice
        .v2v()
        .sessions()
        .info(user_id)
        .await
        .ok_or_else(|| not_found(SESSION_NOT_FOUND))?;
    Ok(Json(info))
}

async fn clear_session(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    PathParam(user_id): PathParam<i64>,
) -> ApiResult<Json<MessageResponse>> {
    ensure_own_session(caller.id, user_id)?;
    if !state.voice.v2v().sessions().clear_history(user_id).await {
        return Err(not_found(SESSION_NOT_FOUND));
    }
    info!("Cleared V2V history for user {}", user_id);
    Ok(MessageResponse::new("User session cleared successfully"))
}

async fn voice_stats(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> Json<VoiceStats> {
    Json(state.voice.v2v().stats().await)
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app, call, register, test_state};
    use axum::http::{Method, StatusCode};
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn test_status_without_keys() {
        let state = test_state().await;
        let app = app(&state);

        let (status, body) = call(&app, Method::GET, "/api/v1/voice/status", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["openai_api_key_valid"], false);
        assert_eq!(body["groq_api_key_valid"], false);
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let state = test_state().await;
        let app = app(&state);
        let token = register(&app, "speaker").await;
        let (_, me) = call(&app, Method::GET, "/api/v1/users/me", Some(&token), None).await;
        let user_id = me["id"].as_i64().unwrap();
        let uri = format!("/api/v1/voice/sessions/{}", user_id);

        let (status, body) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User session not found");

        let (tx, _rx) = unbounded_channel();
        state.voice.v2v().connect(user_id, &tx).await;

        let (status, info) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["user_id"], user_id);
        assert_eq!(info["is_processing"], false);
        assert_eq!(info["conversation_count"], 0);
        assert_eq!(info["language"], "kk");

        let (_, stats) = call(&app, Method::GET, "/api/v1/voice/stats", Some(&token), None).await;
        assert_eq!(stats["active_sessions"], 1);
        assert_eq!(stats["active_connections"], 1);
        assert_eq!(stats["service_status"], "operational");

        let (status, body) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User session cleared successfully");
    }

    #[tokio::test]
    async fn test_other_users_session_is_forbidden() {
        let app = app(&test_state().await);
        let token = register(&app, "speaker").await;

        let (status, body) = call(&app, Method::GET, "/api/v1/voice/sessions/9999", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");

        let (status, _) = call(&app, Method::GET, "/api/v1/voice/stats", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
