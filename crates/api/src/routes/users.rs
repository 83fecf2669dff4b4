use crate::{
    auth::{hash_password, validate_password, CurrentUser},
    error::{not_found, ApiResult},
    extract::{JsonBody, PathParam, QueryParams},
    routes::{page_request, ListEnvelope, MessageResponse},
    AppState,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use waypoint_common::WaypointError;
use waypoint_core::models::{NewUser, User, UserChanges};

const USER_NOT_FOUND: &str = "User not found";
const USERNAME_EXISTS: &str = "Username already exists";

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub is_active: Option<bool>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_me))
        .route("/:user_id", get(get_user).put(update_user).delete(delete_user))
}

async fn create_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    JsonBody(request): JsonBody<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    validate_password(&request.password)?;
    if state.core.users.find_by_username(&request.username).await?.is_some() {
        return Err(WaypointError::BadRequest(USERNAME_EXISTS.to_string()).into());
    }

    let user = state
        .core
        .users
        .create(&NewUser {
            username: request.username,
            hashed_password: hash_password(&request.password)?,
            first_name: request.first_name,
            last_name: request.last_name,
        })
        .await
        .map_err(|e| match e {
            WaypointError::BadRequest(_) => {
                WaypointError::BadRequest(USERNAME_EXISTS.to_string())
            }
            other => other,
        })?;
    Ok(Json(user))
}

/// Live users only. An empty result still reports one page.
async fn list_users(
    State(state): State<AppState>,
    _caller: CurrentUser,
    QueryParams(query): QueryParams<UserListQuery>,
) -> ApiResult<ListEnvelope<User>> {
    let page = page_request(query.page, query.size)?;
    let users = state.core.users.list(page, query.is_active).await?;
    let pages = users.pages_at_least_one();
    Ok(ListEnvelope::with_pages("users", users, pages))
}

async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn get_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(user_id): PathParam<i64>,
) -> ApiResult<Json<User>> {
    let user = state
        .core
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| not_found(USER_NOT_FOUND))?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(user_id): PathParam<i64>,
    JsonBody(changes): JsonBody<UserChanges>,
) -> ApiResult<Json<User>> {
    let user = state
        .core
        .users
        .update(user_id, &changes)
        .await?
        .ok_or_else(|| not_found(USER_NOT_FOUND))?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    PathParam(user_id): PathParam<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.core.users.soft_delete(user_id).await? {
        return Err(not_found(USER_NOT_FOUND));
    }
    info!("User {} deleted by {}", user_id, caller.id);
    Ok(MessageResponse::new("User deleted successfully"))
}
