use crate::{
    auth::{CurrentUser, LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserInfo},
    error::ApiResult,
    extract::{FormBody, JsonBody},
    routes::MessageResponse,
    AppState,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/token", post(login_form))
        .route("/refresh", post(refresh_token))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.auth.register(&state.core.users, request).await?;
    Ok(Json(state.auth.issue_tokens(user.id)?))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    debug!("Login attempt for user: {}", request.username);
    let user = state.auth.authenticate(&state.core.users, &request).await?;
    Ok(Json(state.auth.issue_tokens(user.id)?))
}

/// OAuth2 password flow: the same credentials as a urlencoded form.
async fn login_form(
    State(state): State<AppState>,
    FormBody(request): FormBody<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.auth.authenticate(&state.core.users, &request).await?;
    Ok(Json(state.auth.issue_tokens(user.id)?))
}

async fn refresh_token(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(state.auth.refresh(&state.core.users, &request).await?))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserInfo> {
    Json(UserInfo::from(&user))
}

// Tokens are stateless; the client discards them.
async fn logout() -> Json<MessageResponse> {
    MessageResponse::new("Successfully logged out")
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app, call, register, test_state};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_register_login_and_me() {
        let app = app(&test_state().await);
        let token = register(&app, "aigerim").await;

        let (status, body) = call(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "aigerim");
        assert_eq!(body["is_active"], true);
        assert!(body.get("hashed_password").is_none());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "aigerim", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 3600);
    }

    #[tokio::test]
    async fn test_duplicate_and_bad_credentials() {
        let app = app(&test_state().await);
        register(&app, "aigerim").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "aigerim", "password": "another1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username already registered");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "aigerim", "password": "wrong-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Incorrect username or password");
    }

    #[tokio::test]
    async fn test_token_form_login() {
        let app = app(&test_state().await);
        register(&app, "nurlan").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/auth/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=nurlan&password=secret123"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_requires_refresh_token() {
        let app = app(&test_state().await);
        let (_, tokens) = call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "dana", "password": "secret123"})),
        )
        .await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({"refresh_token": tokens["refresh_token"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({"refresh_token": tokens["access_token"]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid refresh token");
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let app = app(&test_state().await);
        let (status, body) = call(&app, Method::GET, "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");

        let (status, body) = call(&app, Method::POST, "/api/v1/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Successfully logged out");
    }
}
