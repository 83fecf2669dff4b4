use crate::{
    auth::CurrentUser,
    error::{not_found, ApiResult},
    extract::{JsonBody, PathParam, QueryParams},
    routes::{page_request, ListEnvelope, MessageResponse, SearchQuery},
    AppState,
};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use waypoint_core::geo::GeoPoint;
use waypoint_core::models::{Coin, CoinChanges, NearbyCoin, NewCoin};

const COIN_NOT_FOUND: &str = "Coin not found";

#[derive(Debug, Deserialize)]
pub struct CoinListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub map_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: Option<f64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coins).post(create_coin))
        .route("/search", get(search_coins))
        .route("/ar", get(ar_coins))
        .route("/nearby", get(nearby_coins))
        .route("/:coin_id", get(get_coin).put(update_coin).delete(delete_coin))
}

async fn create_coin(
    State(state): State<AppState>,
    _caller: CurrentUser,
    JsonBody(coin): JsonBody<NewCoin>,
) -> ApiResult<Json<Coin>> {
    Ok(Json(state.core.coins.create(&coin).await?))
}

async fn list_coins(
    State(state): State<AppState>,
    _caller: CurrentUser,
    QueryParams(query): QueryParams<CoinListQuery>,
) -> ApiResult<ListEnvelope<Coin>> {
    let page = page_request(query.page, query.size)?;
    Ok(ListEnvelope::new(
        "items",
        state.core.coins.list(page, query.map_id).await?,
    ))
}

async fn search_coins(
    State(state): State<AppState>,
    _caller: CurrentUser,
    QueryParams(query): QueryParams<SearchQuery>,
) -> ApiResult<ListEnvelope<Coin>> {
    let page = query.page_request()?;
    Ok(ListEnvelope::new(
        "items",
        state.core.coins.search(&query.q, page).await?,
    ))
}

async fn ar_coins(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> ApiResult<Json<Vec<Coin>>> {
    Ok(Json(state.core.coins.active_ar_coins().await?))
}

async fn nearby_coins(
    State(state): State<AppState>,
    _caller: CurrentUser,
    QueryParams(query): QueryParams<NearbyQuery>,
) -> ApiResult<Json<Vec<NearbyCoin>>> {
    let origin = GeoPoint::new(query.latitude, query.longitude)?;
    let radius_m = query
        .radius_m
        .unwrap_or_else(|| state.core.collections.radius_m());
    Ok(Json(state.core.coins.nearby(origin, radius_m).await?))
}

async fn get_coin(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(coin_id): PathParam<i64>,
) -> ApiResult<Json<Coin>> {
    let coin = state
        .core
        .coins
        .find(coin_id)
        .await?
        .ok_or_else(|| not_found(COIN_NOT_FOUND))?;
    Ok(Json(coin))
}

async fn update_coin(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(coin_id): PathParam<i64>,
    JsonBody(changes): JsonBody<CoinChanges>,
) -> ApiResult<Json<Coin>> {
    let coin = state
        .core
        .coins
        .update(coin_id, &changes)
        .await?
        .ok_or_else(|| not_found(COIN_NOT_FOUND))?;
    Ok(Json(coin))
}

async fn delete_coin(
    State(state): State<AppState>,
    _caller: CurrentUser,
    PathParam(coin_id): PathParam<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.core.coins.soft_delete(coin_id).await? {
        return Err(not_found(COIN_NOT_FOUND));
    }
    Ok(MessageResponse::new("Coin deleted successfully"))
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::routes::testing::{app, call, register, test_state, test_state_with_radius};
    use axum::http::{Method, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};

    /// Creates a map with one coin at each position and returns the coin ids.
    pub(crate) async fn seed_coins(app: &Router, token: &str, positions: &[(f64, f64)]) -> Vec<i64> {
        let (_, map) = call(
            app,
            Method::POST,
            "/api/v1/maps",
            Some(token),
            Some(json!({"name": "Astana", "latitude": 51.1283, "longitude": 71.4305})),
        )
        .await;
        let map_id = map["id"].as_i64().unwrap();

        let mut ids = Vec::new();
        for (i, (latitude, longitude)) in positions.iter().enumerate() {
            let (status, coin) = call(
                app,
                Method::POST,
                "/api/v1/coins",
                Some(token),
                Some(json!({
                    "map_id": map_id,
                    "latitude": latitude,
                    "longitude": longitude,
                    "name": format!("Coin {}", i),
                    "symbol": "TNG"
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "coin create failed: {}", coin);
            ids.push(coin["id"].as_i64().unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_coin_requires_existing_map() {
        let app = app(&test_state().await);
        let token = register(&app, "collector").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/coins",
            Some(&token),
            Some(json!({"map_id": 999, "latitude": 1.0, "longitude": 1.0})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Map not found");
    }

    #[tokio::test]
    async fn test_coin_defaults_and_soft_delete() {
        let app = app(&test_state().await);
        let token = register(&app, "collector").await;
        let ids = seed_coins(&app, &token, &[(51.1283, 71.4305)]).await;
        let uri = format!("/api/v1/coins/{}", ids[0]);

        let (_, coin) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(coin["ar_scale"], 1.0);
        assert_eq!(coin["is_collected"], false);
        assert_eq!(coin["collected_by_id"], Value::Null);

        let (status, body) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Coin deleted successfully");

        let (status, _) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = call(&app, Method::GET, "/api/v1/coins", Some(&token), None).await;
        assert_eq!(list["total"], 0);
    }

    #[tokio::test]
    async fn test_ar_and_search() {
        let app = app(&test_state().await);
        let token = register(&app, "collector").await;
        let ids = seed_coins(&app, &token, &[(51.0, 71.0), (51.001, 71.0)]).await;

        call(
            &app,
            Method::PUT,
            &format!("/api/v1/coins/{}", ids[1]),
            Some(&token),
            Some(json!({"ar_model_url": "https://cdn.example.com/coin.glb", "description": "Golden eagle"})),
        )
        .await;

        let (_, ar) = call(&app, Method::GET, "/api/v1/coins/ar", Some(&token), None).await;
        assert_eq!(ar.as_array().unwrap().len(), 1);
        assert_eq!(ar[0]["id"], ids[1]);

        let (_, found) = call(&app, Method::GET, "/api/v1/coins/search?q=eagle", Some(&token), None).await;
        assert_eq!(found["total"], 1);

        let (_, all) = call(&app, Method::GET, "/api/v1/coins/search?q=tng", Some(&token), None).await;
        assert_eq!(all["total"], 2);
    }

    #[tokio::test]
    async fn test_nearby_sorted_by_distance() {
        let app = app(&test_state().await);
        let token = register(&app, "collector").await;
        // Roughly 33 m, 11 m and 2.2 km north of the origin.
        let ids = seed_coins(&app, &token, &[(51.0003, 71.0), (51.0001, 71.0), (51.02, 71.0)]).await;

        let (status, nearby) = call(
            &app,
            Method::GET,
            "/api/v1/coins/nearby?latitude=51.0&longitude=71.0",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let nearby = nearby.as_array().unwrap();
        assert_eq!(nearby.len(), 2);
        assert_eq!(nearby[0]["id"], ids[1]);
        assert_eq!(nearby[1]["id"], ids[0]);
        assert!(nearby[0]["distance_m"].as_f64().unwrap() < 12.0);

        let (status, _) = call(
            &app,
            Method::GET,
            "/api/v1/coins/nearby?latitude=51.0&longitude=71.0&radius_m=0",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_nearby_defaults_to_configured_radius() {
        let app = app(&test_state_with_radius(20.0).await);
        let token = register(&app, "collector").await;
        let ids = seed_coins(&app, &token, &[(51.0003, 71.0), (51.0001, 71.0)]).await;

        let (status, nearby) = call(
            &app,
            Method::GET,
            "/api/v1/coins/nearby?latitude=51.0&longitude=71.0",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let nearby = nearby.as_array().unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0]["id"], ids[1]);
    }
}
