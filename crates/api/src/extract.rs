use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Request,
    },
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// `axum::Json` whose rejection renders as the standard error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

/// `axum::Form` whose rejection renders as the standard error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormBody<T>(pub T);

/// `axum::extract::Query` whose rejection renders as the standard error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

/// `axum::extract::Path` whose rejection renders as the standard error body.
#[derive(Debug, Clone, Copy)]
pub struct PathParam<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected JSON body: {}", rejection.body_text());
        ApiError::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        debug!("Rejected form body: {}", rejection.body_text());
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        debug!("Rejected query string: {}", rejection.body_text());
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Rejected path parameters: {}", rejection.body_text());
        ApiError::Validation(rejection.body_text())
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for FormBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Form(value) = axum::Form::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app, call, register, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_field_uses_error_body() {
        let app = app(&test_state().await);

        let (status, body) = call(&app, Method::POST, "/api/v1/auth/login", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("username"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_bad_query_and_path_use_error_body() {
        let app = app(&test_state().await);
        let token = register(&app, "walker").await;

        let (status, body) = call(
            &app,
            Method::GET,
            "/api/v1/coins/nearby?latitude=north&longitude=71.0",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");

        let (status, body) = call(&app, Method::GET, "/api/v1/coins/abc", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
