use crate::database::{db_error, DatabaseUtils};
use crate::geo::{GeoPoint, EARTH_RADIUS_M};
use crate::models::{Coin, CoinChanges, NearbyCoin, NewCoin};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};
use waypoint_common::{Page, PageRequest, Result, WaypointError};

pub(crate) const COIN_COLUMNS: &str = "id, map_id, latitude, longitude, name, symbol, description, \
     ar_model_url, ar_scale, ar_position_x, ar_position_y, ar_position_z, \
     is_collected, collected_by_id, collected_at, is_active, is_deleted, created_at, updated_at";

#[derive(Clone)]
pub struct CoinRepository {
    pool: SqlitePool,
}

impl CoinRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a coin on an existing map.
    pub async fn create(&self, coin: &NewCoin) -> Result<Coin> {
        coin.validate()?;

        let map_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM maps WHERE id = ?")
            .bind(coin.map_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load map", e))?;
        if map_exists.is_none() {
            return Err(WaypointError::NotFound("Map not found".to_string()));
        }

        let created = sqlx::query_as::<_, Coin>(&format!(
            "INSERT INTO coins (map_id, latitude, longitude, name, symbol, description, ar_model_url, \
                ar_scale, ar_position_x, ar_position_y, ar_position_z, \
                is_collected, is_active, is_deleted, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1, 0, ?) RETURNING {}",
            COIN_COLUMNS
        ))
        .bind(coin.map_id)
        .bind(coin.latitude)
        .bind(coin.longitude)
        .bind(&coin.name)
        .bind(&coin.symbol)
        .bind(&coin.description)
        .bind(&coin.ar_model_url)
        .bind(coin.ar_scale.unwrap_or(1.0))
        .bind(coin.ar_position_x.unwrap_or(0.0))
        .bind(coin.ar_position_y.unwrap_or(0.0))
        .bind(coin.ar_position_z.unwrap_or(0.0))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create coin", e))?;

        info!("Created coin {} on map {}", created.id, created.map_id);
        Ok(created)
    }

    /// Looks up a coin that has not been soft-deleted.
    pub async fn find(&self, id: i64) -> Result<Option<Coin>> {
        sqlx::query_as::<_, Coin>(&format!(
            "SELECT {} FROM coins WHERE id = ? AND is_deleted = 0",
            COIN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load coin", e))
    }

    pub async fn list(&self, page: PageRequest, map_id: Option<i64>) -> Result<Page<Coin>> {
        self.fetch_page(CoinFilter { map_id, term: None }, page).await
    }

    /// Substring match over name, symbol and description.
    pub async fn search(&self, term: &str, page: PageRequest) -> Result<Page<Coin>> {
        self.fetch_page(
            CoinFilter {
                map_id: None,
                term: Some(DatabaseUtils::contains_pattern(term)),
            },
            page,
        )
        .await
    }

    async fn fetch_page(&self, filter: CoinFilter, page: PageRequest) -> Result<Page<Coin>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM coins WHERE is_deleted = 0");
        filter.push_to(&mut count);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count coins", e))?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM coins WHERE is_deleted = 0",
            COIN_COLUMNS
        ));
        filter.push_to(&mut select);
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let coins = select
            .build_query_as::<Coin>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list coins", e))?;

        Ok(Page::new(coins, total, page))
    }

    /// Active coins that carry an AR model.
    pub async fn active_ar_coins(&self) -> Result<Vec<Coin>> {
        sqlx::query_as::<_, Coin>(&format!(
            "SELECT {} FROM coins \
             WHERE is_active = 1 AND is_deleted = 0 AND ar_model_url IS NOT NULL AND ar_model_url != '' \
             ORDER BY id",
            COIN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list AR coins", e))
    }

    pub async fn update(&self, id: i64, changes: &CoinChanges) -> Result<Option<Coin>> {
        changes.validate()?;

        sqlx::query_as::<_, Coin>(&format!(
            "UPDATE coins SET \
                latitude = COALESCE(?, latitude), \
                longitude = COALESCE(?, longitude), \
                name = COALESCE(?, name), \
                symbol = COALESCE(?, symbol), \
                description = COALESCE(?, description), \
                ar_model_url = COALESCE(?, ar_model_url), \
                ar_scale = COALESCE(?, ar_scale), \
                ar_position_x = COALESCE(?, ar_position_x), \
                ar_position_y = COALESCE(?, ar_position_y), \
                ar_position_z = COALESCE(?, ar_position_z), \
                is_collected = COALESCE(?, is_collected), \
                collected_by_id = COALESCE(?, collected_by_id), \
                collected_at = COALESCE(?, collected_at), \
                is_active = COALESCE(?, is_active), \
                updated_at = ? \
             WHERE id = ? AND is_deleted = 0 RETURNING {}",
            COIN_COLUMNS
        ))
        .bind(changes.latitude)
        .bind(changes.longitude)
        .bind(&changes.name)
        .bind(&changes.symbol)
        .bind(&changes.description)
        .bind(&changes.ar_model_url)
        .bind(changes.ar_scale)
        .bind(changes.ar_position_x)
        .bind(changes.ar_position_y)
        .bind(changes.ar_position_z)
        .bind(changes.is_collected)
        .bind(changes.collected_by_id)
        .bind(changes.collected_at)
        .bind(changes.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update coin", e))
    }

    pub async fn soft_delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE coins SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete coin", e))?;

        if result.rows_affected() > 0 {
            info!("Soft-deleted coin {}", id);
        }
        Ok(result.rows_affected() > 0)
    }

    /// Coins that can still be collected by someone.
    pub async fn count_available(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM coins WHERE is_active = 1 AND is_deleted = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count coins", e))
    }

    /// Active coins within `radius_m` of `origin`, nearest first.
    pub async fn nearby(&self, origin: GeoPoint, radius_m: f64) -> Result<Vec<NearbyCoin>> {
        if radius_m.is_nan() || radius_m <= 0.0 {
            return Err(WaypointError::Validation(
                "radius_m must be positive".to_string(),
            ));
        }

        // Bounding box prefilter; the exact check happens below.
        let lat_delta = (radius_m / EARTH_RADIUS_M).to_degrees();
        let cos_lat = origin.latitude.to_radians().cos().abs();
        let lon_delta = if cos_lat < 1e-6 {
            180.0
        } else {
            (lat_delta / cos_lat).min(180.0)
        };

        let candidates = sqlx::query_as::<_, Coin>(&format!(
            "SELECT {} FROM coins \
             WHERE is_active = 1 AND is_deleted = 0 \
               AND latitude BETWEEN ? AND ? \
               AND longitude BETWEEN ? AND ?",
            COIN_COLUMNS
        ))
        .bind(origin.latitude - lat_delta)
        .bind(origin.latitude + lat_delta)
        .bind(origin.longitude - lon_delta)
        .bind(origin.longitude + lon_delta)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load nearby coins", e))?;

        debug!("{} candidate coins in bounding box", candidates.len());

        let mut nearby: Vec<NearbyCoin> = candidates
            .into_iter()
            .filter_map(|coin| {
                let distance_m = origin.distance_to(&GeoPoint {
                    latitude: coin.latitude,
                    longitude: coin.longitude,
                });
                (distance_m <= radius_m).then_some(NearbyCoin { coin, distance_m })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

        Ok(nearby)
    }
}

struct CoinFilter {
    map_id: Option<i64>,
    term: Option<String>,
}

impl CoinFilter {
    fn push_to<'a>(&'a self, builder: &mut QueryBuilder<'a, Sqlite>) {
        if let Some(map_id) = self.map_id {
            builder.push(" AND map_id = ").push_bind(map_id);
        }
        if let Some(pattern) = self.term.as_deref() {
            builder
                .push(" AND (name LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\' OR symbol LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\' OR description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::tests::memory_database;
    use crate::maps::MapRepository;
    use crate::models::NewMap;

    pub(crate) async fn seed_map(pool: &SqlitePool) -> i64 {
        MapRepository::new(pool.clone())
            .create(&NewMap {
                name: "Astana".to_string(),
                description: None,
                latitude: 51.1282,
                longitude: 71.4304,
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }

    pub(crate) fn new_coin(map_id: i64, latitude: f64, longitude: f64) -> NewCoin {
        NewCoin {
            map_id,
            latitude,
            longitude,
            name: None,
            symbol: None,
            description: None,
            ar_model_url: None,
            ar_scale: None,
            ar_position_x: None,
            ar_position_y: None,
            ar_position_z: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_map() {
        let db = memory_database().await;
        let repo = CoinRepository::new(db.pool().clone());

        let err = repo.create(&new_coin(42, 51.0, 71.0)).await.unwrap_err();
        assert!(matches!(err, WaypointError::NotFound(ref m) if m == "Map not found"));

        let map_id = seed_map(db.pool()).await;
        let coin = repo.create(&new_coin(map_id, 51.0, 71.0)).await.unwrap();
        assert_eq!(coin.ar_scale, 1.0);
        assert!(coin.is_active);
        assert!(!coin.is_collected);
    }

    #[tokio::test]
    async fn test_list_by_map_and_soft_delete() {
        let db = memory_database().await;
        let repo = CoinRepository::new(db.pool().clone());
        let first = seed_map(db.pool()).await;
        let second = seed_map(db.pool()).await;

        let a = repo.create(&new_coin(first, 51.0, 71.0)).await.unwrap();
        repo.create(&new_coin(first, 51.1, 71.1)).await.unwrap();
        repo.create(&new_coin(second, 51.2, 71.2)).await.unwrap();

        let on_first = repo.list(PageRequest::default(), Some(first)).await.unwrap();
        assert_eq!(on_first.total, 2);

        assert!(repo.soft_delete(a.id).await.unwrap());
        assert!(repo.find(a.id).await.unwrap().is_none());
        assert!(repo.update(a.id, &CoinChanges::default()).await.unwrap().is_none());

        let all = repo.list(PageRequest::default(), None).await.unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn test_search_and_ar_listing() {
        let db = memory_database().await;
        let repo = CoinRepository::new(db.pool().clone());
        let map_id = seed_map(db.pool()).await;

        let mut gold = new_coin(map_id, 51.0, 71.0);
        gold.name = Some("Golden Eagle".to_string());
        gold.symbol = Some("GLD".to_string());
        gold.ar_model_url = Some("https://cdn.example/eagle.glb".to_string());
        repo.create(&gold).await.unwrap();

        let mut silver = new_coin(map_id, 51.0, 71.0);
        silver.description = Some("A silver snow leopard".to_string());
        let silver = repo.create(&silver).await.unwrap();

        assert_eq!(repo.search("gld", PageRequest::default()).await.unwrap().total, 1);
        assert_eq!(repo.search("leopard", PageRequest::default()).await.unwrap().total, 1);
        assert_eq!(repo.search("zzz", PageRequest::default()).await.unwrap().total, 0);

        let ar = repo.active_ar_coins().await.unwrap();
        assert_eq!(ar.len(), 1);
        assert_eq!(ar[0].symbol.as_deref(), Some("GLD"));

        repo.update(
            silver.id,
            &CoinChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(repo.count_available().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deleting_map_removes_coins() {
        let db = memory_database().await;
        let repo = CoinRepository::new(db.pool().clone());
        let map_id = seed_map(db.pool()).await;
        let coin = repo.create(&new_coin(map_id, 51.0, 71.0)).await.unwrap();

        MapRepository::new(db.pool().clone()).delete(map_id).await.unwrap();
        assert!(repo.find(coin.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nearby_sorted_by_distance() {
        let db = memory_database().await;
        let repo = CoinRepository::new(db.pool().clone());
        let map_id = seed_map(db.pool()).await;

        let origin = GeoPoint::new(51.128200, 71.430400).unwrap();
        let far = repo.create(&new_coin(map_id, 51.128600, 71.430400)).await.unwrap();
        let near = repo.create(&new_coin(map_id, 51.128300, 71.430400)).await.unwrap();
        repo.create(&new_coin(map_id, 51.140000, 71.430400)).await.unwrap();

        let found = repo.nearby(origin, 50.0).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].coin.id, near.id);
        assert_eq!(found[1].coin.id, far.id);
        assert!(found[0].distance_m < found[1].distance_m);

        assert!(repo.nearby(origin, 0.0).await.is_err());
    }
}
