pub mod health;
pub mod auth;
pub mod users;
pub mod maps;
pub mod coins;
pub mod speech;
pub mod coin_collections;
pub mod location;
pub mod voice;

use crate::{
    error::{not_found, ApiError},
    AppState,
};
use axum::{
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_common::{Page, PageRequest, DEFAULT_PAGE_SIZE};

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health check routes (no authentication required)
        .nest("/api/health", health::routes())
        .nest("/api/v1", v1_routes())
}

fn v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .nest("/maps", maps::routes())
        .nest("/coins", coins::routes())
        .nest("/stt", speech::stt_routes())
        .nest("/tts", speech::tts_routes())
        .nest("/coin-collections", coin_collections::routes())
        .nest("/location", location::routes())
        .nest("/voice", voice::routes())
}

pub async fn not_found_handler() -> impl IntoResponse {
    not_found("Not Found")
}

/// Free-text search plus paging, as taken by every `/search` endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl SearchQuery {
    pub fn page_request(&self) -> waypoint_common::Result<PageRequest> {
        page_request(self.page, self.size)
    }
}

pub fn page_request(page: Option<u32>, size: Option<u32>) -> waypoint_common::Result<PageRequest> {
    PageRequest::new(page.unwrap_or(1), size.unwrap_or(DEFAULT_PAGE_SIZE))
}

/// List envelope whose items key differs per resource.
pub struct ListEnvelope<T> {
    key: &'static str,
    page: Page<T>,
    pages: i64,
}

impl<T> ListEnvelope<T> {
    pub fn new(key: &'static str, page: Page<T>) -> Self {
        let pages = page.pages();
        Self::with_pages(key, page, pages)
    }

    pub fn with_pages(key: &'static str, page: Page<T>, pages: i64) -> Self {
        Self { key, page, pages }
    }
}

impl<T: Serialize> IntoResponse for ListEnvelope<T> {
    fn into_response(self) -> Response {
        let items = match serde_json::to_value(&self.page.items) {
            Ok(items) => items,
            Err(e) => return ApiError::Internal(format!("Failed to encode list: {}", e)).into_response(),
        };

        let mut body = serde_json::Map::new();
        body.insert(self.key.to_string(), items);
        body.insert("total".to_string(), self.page.total.into());
        body.insert("page".to_string(), self.page.page.into());
        body.insert("size".to_string(), self.page.size.into());
        body.insert("pages".to_string(), self.pages.into());
        Json(Value::Object(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::auth::{AuthConfig, AuthService};
    use crate::AppState;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;
    use waypoint_core::database::DatabaseConfig;
    use waypoint_core::{AppCore, CoreConfig};
    use waypoint_voice::{VoiceConfig, VoiceService};

    pub(crate) async fn test_state() -> AppState {
        test_state_with_radius(waypoint_core::geo::DEFAULT_COLLECTION_RADIUS_M).await
    }

    pub(crate) async fn test_state_with_radius(collection_radius_m: f64) -> AppState {
        let core = AppCore::new(CoreConfig {
            database_config: DatabaseConfig::in_memory(),
            collection_radius_m,
            ..CoreConfig::default()
        })
        .await
        .unwrap();
        let voice = VoiceService::new(VoiceConfig::default()).unwrap();
        let auth = AuthService::new(AuthConfig {
            jwt_secret: "route-test-secret".to_string(),
            ..AuthConfig::default()
        });
        AppState::new(Arc::new(core), voice, Arc::new(auth))
    }

    pub(crate) fn app(state: &AppState) -> Router {
        super::create_routes()
            .fallback(super::not_found_handler)
            .with_state(state.clone())
    }

    pub(crate) async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Registers `username` and returns its access token.
    pub(crate) async fn register(app: &Router, username: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(serde_json::json!({"username": username, "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }
}
