pub mod routes;
pub mod middleware;
pub mod websocket;
pub mod auth;
pub mod server;
pub mod error;
pub mod extract;

use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use waypoint_common::ApiResponse;
use waypoint_core::AppCore;
use waypoint_voice::VoiceService;

pub use auth::{AuthConfig, AuthService};
pub use server::ApiServer;

// Re-export common types
pub use waypoint_common;
pub use waypoint_core;
pub use waypoint_voice;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub enable_websockets: bool,
    pub max_request_size: usize,
    pub rate_limit_requests_per_minute: u32,
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            enable_websockets: true,
            max_request_size: 32 * 1024 * 1024, // base64 of a 25 MiB clip fits
            rate_limit_requests_per_minute: 120,
            request_timeout_seconds: 30,
        }
    }
}

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AppCore>,
    pub voice: VoiceService,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(core: Arc<AppCore>, voice: VoiceService, auth: Arc<AuthService>) -> Self {
        Self { core, voice, auth }
    }
}

#[derive(Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub voice: String,
}

pub fn create_success_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

pub fn create_error_response(message: String) -> Json<ApiResponse<()>> {
    Json(ApiResponse::error(message))
}
