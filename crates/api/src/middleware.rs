use crate::{auth::AuthService, error::ApiError, ApiConfig};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: AllowOrigin = if config.cors_origins.iter().any(|origin| origin == "*") {
        Any.into()
    } else {
        config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>()
            .into()
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, REQUEST_ID_HEADER])
        .expose_headers([REQUEST_ID_HEADER])
        .max_age(Duration::from_secs(3600))
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    debug!("Incoming request: {} {}", method, uri);

    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        warn!("Request failed: {} {} - {} - {:?}", method, uri, status, start.elapsed());
    } else {
        info!("Request completed: {} {} - {} - {:?}", method, uri, status, start.elapsed());
    }

    response
}

/// Reuses a client-supplied request id, otherwise mints one.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .cloned()
        .or_else(|| HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok());

    if let Some(id) = &request_id {
        request.headers_mut().insert(REQUEST_ID_HEADER, id.clone());
    }

    let mut response = next.run(request).await;

    if let Some(id) = request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }

    response
}

/// Sliding one-window limiter keyed by client address.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_duration,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn check_rate_limit(&self, client_id: &str) -> bool {
        let mut requests = self.lock();
        let now = Instant::now();

        let client_requests = requests.entry(client_id.to_string()).or_default();
        client_requests.retain(|&request_time| now.duration_since(request_time) < self.window_duration);

        if client_requests.len() < self.max_requests as usize {
            client_requests.push(now);
            true
        } else {
            false
        }
    }

    /// Drops clients with no requests left in the window. Returns how many
    /// clients are still tracked.
    pub fn cleanup_old_entries(&self) -> usize {
        let mut requests = self.lock();
        let now = Instant::now();

        requests.retain(|_, client_requests| {
            client_requests.retain(|&request_time| now.duration_since(request_time) < self.window_duration);
            !client_requests.is_empty()
        });
        requests.len()
    }
}

/// Proxy headers first, then the peer address of the connection.
fn client_id(request: &Request) -> String {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .map(str::trim)
        .filter(|id| !id.is_empty());

    match forwarded {
        Some(id) => id.to_string(),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(peer)| peer.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

pub async fn rate_limiting_middleware(
    State(rate_limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client_id = client_id(&request);

    if rate_limiter.check_rate_limit(&client_id) {
        Ok(next.run(request).await)
    } else {
        warn!("Rate limit exceeded for client: {}", client_id);
        Err(ApiError::RateLimit)
    }
}

/// Bodies must be JSON, multipart or a urlencoded form. Empty bodies pass.
pub async fn content_type_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let has_body = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|len| len.parse::<usize>().ok())
        .map_or(false, |len| len > 0);

    if has_body && matches!(request.method(), &Method::POST | &Method::PUT | &Method::PATCH) {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("application/json")
            && !content_type.starts_with("multipart/form-data")
            && !content_type.starts_with("application/x-www-form-urlencoded")
        {
            return Err(ApiError::InvalidContentType);
        }
    }

    Ok(next.run(request).await)
}

pub async fn request_size_middleware(
    State(max_size): State<usize>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let too_large = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|len| len.parse::<usize>().ok())
        .map_or(false, |len| len > max_size);

    if too_large {
        return Err(ApiError::RequestTooLarge);
    }

    Ok(next.run(request).await)
}

/// Puts the auth service into request extensions for the `CurrentUser` extractor.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth_service);
    next.run(request).await
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

pub fn compression_layer() -> tower_http::compression::CompressionLayer {
    tower_http::compression::CompressionLayer::new()
        .br(true)
        .gzip(true)
        .deflate(true)
}

pub fn timeout_layer(seconds: u64) -> tower_http::timeout::TimeoutLayer {
    tower_http::timeout::TimeoutLayer::new(Duration::from_secs(seconds))
}
