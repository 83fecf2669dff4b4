use crate::{
    middleware::{
        auth_middleware, compression_layer, content_type_middleware, cors_layer,
        rate_limiting_middleware, request_id_middleware, request_logging_middleware,
        request_size_middleware, security_headers_middleware, timeout_layer, RateLimiter,
    },
    routes::{create_routes, not_found_handler},
    websocket, ApiConfig, AppState,
};
use axum::Router;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        let rate_limiter = Arc::new(RateLimiter::per_minute(
            config.rate_limit_requests_per_minute,
        ));

        Self {
            config,
            state,
            rate_limiter,
        }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_app();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("Starting API server on {}", addr);
        info!("CORS origins: {:?}", self.config.cors_origins);
        info!("WebSocket support: {}", self.config.enable_websockets);

        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API server listening on {}", listener.local_addr()?);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.state.core.shutdown().await?;
        info!("API server stopped");
        Ok(())
    }

    pub fn create_app(&self) -> Router {
        let mut app = create_routes();
        if self.config.enable_websockets {
            app = app.merge(websocket::routes());
        }

        app.fallback(not_found_handler)
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    // Outermost layers (applied last)
                    .layer(TraceLayer::new_for_http())
                    .layer(timeout_layer(self.config.request_timeout_seconds))
                    .layer(compression_layer())
                    .layer(cors_layer(&self.config))
                    // Security and validation
                    .layer(axum::middleware::from_fn(security_headers_middleware))
                    .layer(axum::middleware::from_fn_with_state(
                        self.config.max_request_size,
                        request_size_middleware,
                    ))
                    .layer(axum::middleware::from_fn(content_type_middleware))
                    .layer(axum::middleware::from_fn_with_state(
                        self.rate_limiter.clone(),
                        rate_limiting_middleware,
                    ))
                    // Logging and request tracking
                    .layer(axum::middleware::from_fn(request_id_middleware))
                    .layer(axum::middleware::from_fn(request_logging_middleware))
                    .layer(axum::middleware::from_fn_with_state(
                        self.state.auth.clone(),
                        auth_middleware,
                    )),
            )
    }

    fn start_background_tasks(&self) {
        let rate_limiter = self.rate_limiter.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let tracked = rate_limiter.cleanup_old_entries();
                debug!("Rate limiter pruned; {} clients tracked", tracked);
            }
        });

        info!("Background tasks started");
    }

    pub fn get_config(&self) -> &ApiConfig {
        &self.config
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::test_state;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    async fn create_test_server() -> ApiServer {
        ApiServer::new(ApiConfig::default(), test_state().await)
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = create_test_server().await;
        assert_eq!(server.get_config().port, 8000);
        assert!(server.get_config().enable_websockets);
    }

    #[tokio::test]
    async fn test_app_serves_health_with_middleware() {
        let app = create_test_server().await.create_app();

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let app = create_test_server().await.create_app();

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error_code"], "NOT_FOUND");
    }
}
