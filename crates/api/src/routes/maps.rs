use crate::{
    auth::CurrentUser,
    error::{not_found, ApiResult},
    extract::{JsonBody, PathParam, QueryParams},
    routes::{ListEnvelope, MessageResponse, SearchQuery},
    AppState,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use waypoint_common::PageRequest;
use waypoint_core::models::{Map, MapChanges, NewMap};

const MAP_NOT_FOUND: &str = "Map not found";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_maps).post(create_map))
        .route("/search", get(search_maps))
        .route("/:map_id", get(get_map).put(update_map).delete(delete_map))
}

async fn create_map(
    State(state): State<AppState>,
    _caller: CurrentUser,
    JsonBody(map): JsonBody<NewMap>,
) -> ApiResult<Json<Map>> {
    Ok(Json(state.core.maps.create(&map).await?))
}

async fn list_maps(
    State(state): State<AppState>,
    _caller: CurrentUser,
    QueryParams(page): QueryParams<PageRequest>,
) -> ApiResult<ListEnvelope<Map>> {
    page.validate()?;
    Ok(ListEnvelope::new("items", state.core.maps.list(page).await?))
}

async fn search_maps(
    State(state): State<AppState>,
    _caller: CurrentUser,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<ListEnvelope<Map>> {
    let page = query.page_request()?;
    Ok(ListEnvelope::new(
        "items",
        state.core.maps.search(&query.q, page).await?,
    ))
}

async fn get_map(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(map_id): PathParam<i64>,
) -> ApiResult<Json<Map>> {
    let map = state
        .core
        .maps
        .find(map_id)
        .await?
        .ok_or_else(|| not_found(MAP_NOT_FOUND))?;
    Ok(Json(map))
}

async fn update_map(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(map_id): PathParam<i64>,
    JsonBody(changes): JsonBody<MapChanges>,
) -> ApiResult<Json<Map>> {
    let map = state
        .core
        .maps
        .update(map_id, &changes)
        .await?
        .ok_or_else(|| not_found(MAP_NOT_FOUND))?;
    Ok(Json(map))
}

async fn delete_map(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(map_id): PathParam<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.core.maps.delete(map_id).await? {
        return Err(not_found(MAP_NOT_FOUND));
    }
    Ok(MessageResponse::new("Map deleted successfully"))
}
