use crate::{
    auth::CurrentUser,
    error::{not_found, ApiResult},
    extract::{JsonBody, PathParam, QueryParams},
    routes::MessageResponse,
    AppState,
};
use axum::{
    extract::State,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use waypoint_core::collections::DEFAULT_COLLECTION_LIMIT;
use waypoint_core::geo::GeoPoint;
use waypoint_core::models::{CoinCollection, CollectionSummary};

#[derive(Debug, Deserialize)]
pub struct CollectCoinRequest {
    pub coin_id: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CollectCoinRequest {
    /// The reported position, when both coordinates were sent.
    fn position(&self) -> waypoint_common::Result<Option<GeoPoint>> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude).map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionListQuery {
    pub limit: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_collections).post(collect_coin))
        .route("/summary", get(collection_summary))
        .route("/collected-ids", get(collected_ids))
        .route("/:collection_id", delete(remove_collection))
}

async fn collect_coin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<CollectCoinRequest>,
) -> ApiResult<Json<CoinCollection>> {
    let position = request.position()?;
    let collection = state
        .core
        .collections
        .collect(user.id, request.coin_id, position)
        .await?;
    Ok(Json(collection))
}

async fn list_collections(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    QueryParams(query): QueryParams<CollectionListQuery>,
) -> ApiResult<Json<Vec<CoinCollection>>> {
    let limit = query.limit.unwrap_or(DEFAULT_COLLECTION_LIMIT);
    Ok(Json(state.core.collections.list_active(user.id, limit).await?))
}

async fn collection_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<CollectionSummary>> {
    Ok(Json(state.core.collections.summary(user.id).await?))
}

async fn collected_ids(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<i64>>> {
    Ok(Json(state.core.collections.collected_coin_ids(user.id).await?))
}

async fn remove_collection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(collection_id): PathParam<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.core.collections.deactivate(user.id, collection_id).await? {
        return Err(not_found("Collection not found"));
    }
    Ok(MessageResponse::new("Collection removed successfully"))
}
