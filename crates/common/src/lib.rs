use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod location;

pub use location::{Attraction, CityInfo, LocationContext, TransportOption, WeatherInfo};

// Error types
#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Voice processing error: {0}")]
    VoiceProcessing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WaypointError {
    /// The message without the variant prefix, suitable for clients.
    pub fn detail(&self) -> &str {
        match self {
            WaypointError::Database(msg)
            | WaypointError::Validation(msg)
            | WaypointError::BadRequest(msg)
            | WaypointError::NotFound(msg)
            | WaypointError::Unauthorized(msg)
            | WaypointError::Forbidden(msg)
            | WaypointError::Upstream(msg)
            | WaypointError::VoiceProcessing(msg)
            | WaypointError::Configuration(msg)
            | WaypointError::Internal(msg) => msg,
        }
    }
}

pub type Result<T> = std::result::Result<T, WaypointError>;

// API response types
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page/size query parameters shared by every list endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_size(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Result<Self> {
        let request = Self { page, size };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(WaypointError::Validation("page must be at least 1".to_string()));
        }
        if self.size < 1 || self.size > MAX_PAGE_SIZE {
            return Err(WaypointError::Validation(format!(
                "size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.size as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }
}

/// One page of results plus the totals needed to render the list envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            size: request.size,
        }
    }

    pub fn pages(&self) -> i64 {
        if self.size == 0 {
            return 0;
        }
        let size = self.size as i64;
        (self.total + size - 1) / size
    }

    /// Like `pages`, but an empty result still reports a single page.
    pub fn pages_at_least_one(&self) -> i64 {
        self.pages().max(1)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response() {
        let response = ApiResponse::success("data");
        assert!(response.success);
        assert_eq!(response.data, Some("data"));

        let error_response: ApiResponse<String> = ApiResponse::error("error".to_string());
        assert!(!error_response.success);
        assert_eq!(error_response.error, Some("error".to_string()));
    }

    #[test]
    fn test_page_request_bounds() {
        assert!(PageRequest::new(1, 10).is_ok());
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(1, 101).is_err());
        assert!(PageRequest::new(3, 100).is_ok());
    }

    #[test]
    fn test_page_offset() {
        let request = PageRequest::new(3, 20).unwrap();
        assert_eq!(request.offset(), 40);
        assert_eq!(request.limit(), 20);
    }

    #[test]
    fn test_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], 21, PageRequest::new(1, 10).unwrap());
        assert_eq!(page.pages(), 3);

        let empty: Page<u8> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.pages(), 0);
        assert_eq!(empty.pages_at_least_one(), 1);
    }

    #[test]
    fn test_error_detail_strips_prefix() {
        let err = WaypointError::NotFound("Coin not found".to_string());
        assert_eq!(err.detail(), "Coin not found");
        assert_eq!(err.to_string(), "Not found: Coin not found");
    }
}
