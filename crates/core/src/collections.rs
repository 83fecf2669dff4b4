use crate::coins::COIN_COLUMNS;
use crate::database::db_error;
use crate::geo::GeoPoint;
use crate::models::{Coin, CoinCollection, CollectionStats, CollectionSummary};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use waypoint_common::{Result, WaypointError};

pub const DEFAULT_COLLECTION_LIMIT: i64 = 50;
const RECENT_COLLECTIONS: i64 = 10;

const COLLECTION_COLUMNS: &str = "id, user_id, coin_id, collected_at, is_active";

#[derive(Clone)]
pub struct CollectionRepository {
    pool: SqlitePool,
    radius_m: f64,
}

impl CollectionRepository {
    pub fn new(pool: SqlitePool, radius_m: f64) -> Self {
        Self { pool, radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Records that `user_id` picked up `coin_id`.
    ///
    /// Proximity is only enforced when the caller reports a position. The
    /// first collector of a coin is stamped on the coin itself.
    pub async fn collect(
        &self,
        user_id: i64,
        coin_id: i64,
        position: Option<GeoPoint>,
    ) -> Result<CoinCollection> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to start transaction", e))?;

        let coin = sqlx::query_as::<_, Coin>(&format!(
            "SELECT {} FROM coins WHERE id = ? AND is_active = 1 AND is_deleted = 0",
            COIN_COLUMNS
        ))
        .bind(coin_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to load coin", e))?
        .ok_or_else(|| WaypointError::NotFound("Coin not found or inactive".to_string()))?;

        if let Some(position) = position {
            let distance = position.distance_to(&GeoPoint {
                latitude: coin.latitude,
                longitude: coin.longitude,
            });
            debug!("User {} is {:.1} m from coin {}", user_id, distance, coin_id);
            if distance > self.radius_m {
                return Err(WaypointError::BadRequest(format!(
                    "Too far from coin: {:.1} m (max {} m)",
                    distance, self.radius_m
                )));
            }
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM user_coin_collections WHERE user_id = ? AND coin_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .bind(coin_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to check collections", e))?;
        if existing.is_some() {
            return Err(already_collected());
        }

        let now = Utc::now();
        let collection = sqlx::query_as::<_, CoinCollection>(&format!(
            "INSERT INTO user_coin_collections (user_id, coin_id, collected_at, is_active) \
             VALUES (?, ?, ?, 1) RETURNING {}",
            COLLECTION_COLUMNS
        ))
        .bind(user_id)
        .bind(coin_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => already_collected(),
            other => db_error("Failed to record collection", other),
        })?;

        if !coin.is_collected {
            sqlx::query(
                "UPDATE coins SET is_collected = 1, collected_by_id = ?, collected_at = ?, updated_at = ? \
                 WHERE id = ? AND is_collected = 0",
            )
            .bind(user_id)
            .bind(now)
            .bind(now)
            .bind(coin_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to stamp coin", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit collection", e))?;

        info!("User {} collected coin {}", user_id, coin_id);
        Ok(collection)
    }

    /// Active collections, newest first.
    pub async fn list_active(&self, user_id: i64, limit: i64) -> Result<Vec<CoinCollection>> {
        sqlx::query_as::<_, CoinCollection>(&format!(
            "SELECT {} FROM user_coin_collections WHERE user_id = ? AND is_active = 1 \
             ORDER BY collected_at DESC, id DESC LIMIT ?",
            COLLECTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list collections", e))
    }

    pub async fn stats(&self, user_id: i64) -> Result<CollectionStats> {
        let (total_collected, unique_coins): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT coin_id) FROM user_coin_collections \
             WHERE user_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to compute collection stats", e))?;

        let available: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM coins WHERE is_active = 1 AND is_deleted = 0")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("Failed to count coins", e))?;

        Ok(CollectionStats {
            total_collected,
            unique_coins,
            collection_rate: collection_rate(unique_coins, available),
        })
    }

    pub async fn summary(&self, user_id: i64) -> Result<CollectionSummary> {
        let stats = self.stats(user_id).await?;
        let recent_collections = self.list_active(user_id, RECENT_COLLECTIONS).await?;

        Ok(CollectionSummary {
            user_id,
            stats,
            recent_collections,
        })
    }

    pub async fn collected_coin_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT DISTINCT coin_id FROM user_coin_collections \
             WHERE user_id = ? AND is_active = 1 ORDER BY coin_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list collected coins", e))
    }

    /// Soft-removes one of the user's collections.
    pub async fn deactivate(&self, user_id: i64, collection_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_coin_collections SET is_active = 0 \
             WHERE id = ? AND user_id = ? AND is_active = 1",
        )
        .bind(collection_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to remove collection", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn already_collected() -> WaypointError {
    WaypointError::BadRequest("Coin already collected".to_string())
}

/// Percentage of available coins collected, rounded to two decimals.
pub fn collection_rate(unique_coins: i64, available: i64) -> f64 {
    if available <= 0 {
        return 0.0;
    }
    let rate = unique_coins as f64 / available as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coins::tests::{new_coin, seed_map};
    use crate::coins::CoinRepository;
    use crate::database::tests::memory_database;
    use crate::geo::DEFAULT_COLLECTION_RADIUS_M;
    use crate::models::{CoinChanges, NewUser};
    use crate::users::UserRepository;

    struct Fixture {
        _db: crate::database::DatabaseManager,
        collections: CollectionRepository,
        coins: CoinRepository,
        user_id: i64,
        other_user_id: i64,
        map_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = memory_database().await;
        let users = UserRepository::new(db.pool().clone());
        let mut ids = Vec::new();
        for name in ["collector", "rival"] {
            let user = users
                .create(&NewUser {
                    username: name.to_string(),
                    hashed_password: "hash".to_string(),
                    first_name: None,
                    last_name: None,
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        let map_id = seed_map(db.pool()).await;

        Fixture {
            collections: CollectionRepository::new(db.pool().clone(), DEFAULT_COLLECTION_RADIUS_M),
            coins: CoinRepository::new(db.pool().clone()),
            user_id: ids[0],
            other_user_id: ids[1],
            map_id,
            _db: db,
        }
    }

    #[tokio::test]
    async fn test_collect_stamps_first_collector() {
        let f = fixture().await;
        let coin = f.coins.create(&new_coin(f.map_id, 51.1282, 71.4304)).await.unwrap();

        let collection = f.collections.collect(f.user_id, coin.id, None).await.unwrap();
        assert!(collection.is_active);

        f.collections.collect(f.other_user_id, coin.id, None).await.unwrap();

        let stamped = f.coins.find(coin.id).await.unwrap().unwrap();
        assert!(stamped.is_collected);
        assert_eq!(stamped.collected_by_id, Some(f.user_id));
        assert!(stamped.collected_at.is_some());
    }

    #[tokio::test]
    async fn test_collect_twice_is_rejected() {
        let f = fixture().await;
        let coin = f.coins.create(&new_coin(f.map_id, 51.1282, 71.4304)).await.unwrap();

        f.collections.collect(f.user_id, coin.id, None).await.unwrap();
        let err = f.collections.collect(f.user_id, coin.id, None).await.unwrap_err();
        assert_eq!(err.detail(), "Coin already collected");
    }

    #[tokio::test]
    async fn test_collect_checks_distance() {
        let f = fixture().await;
        let coin = f.coins.create(&new_coin(f.map_id, 51.128200, 71.430400)).await.unwrap();

        let far = GeoPoint::new(51.129200, 71.430400).unwrap();
        let err = f.collections.collect(f.user_id, coin.id, Some(far)).await.unwrap_err();
        assert!(matches!(err, WaypointError::BadRequest(_)));
        assert!(err.detail().starts_with("Too far from coin: "));
        assert!(err.detail().ends_with("m (max 50 m)"));

        let near = GeoPoint::new(51.128300, 71.430400).unwrap();
        assert!(f.collections.collect(f.user_id, coin.id, Some(near)).await.is_ok());
    }

    #[tokio::test]
    async fn test_inactive_or_missing_coin() {
        let f = fixture().await;
        let coin = f.coins.create(&new_coin(f.map_id, 51.0, 71.0)).await.unwrap();
        f.coins
            .update(
                coin.id,
                &CoinChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        for id in [coin.id, 9999] {
            let err = f.collections.collect(f.user_id, id, None).await.unwrap_err();
            assert_eq!(err.detail(), "Coin not found or inactive");
        }
    }

    #[tokio::test]
    async fn test_summary_and_deactivate() {
        let f = fixture().await;
        let a = f.coins.create(&new_coin(f.map_id, 51.0, 71.0)).await.unwrap();
        let b = f.coins.create(&new_coin(f.map_id, 51.0, 71.0)).await.unwrap();
        f.coins.create(&new_coin(f.map_id, 51.0, 71.0)).await.unwrap();

        let first = f.collections.collect(f.user_id, a.id, None).await.unwrap();
        f.collections.collect(f.user_id, b.id, None).await.unwrap();

        let summary = f.collections.summary(f.user_id).await.unwrap();
        assert_eq!(summary.stats.total_collected, 2);
        assert_eq!(summary.stats.unique_coins, 2);
        assert_eq!(summary.stats.collection_rate, 66.67);
        assert_eq!(summary.recent_collections.len(), 2);

        assert_eq!(
            f.collections.collected_coin_ids(f.user_id).await.unwrap(),
            vec![a.id, b.id]
        );

        assert!(f.collections.deactivate(f.user_id, first.id).await.unwrap());
        assert!(!f.collections.deactivate(f.user_id, first.id).await.unwrap());
        assert!(!f.collections.deactivate(f.other_user_id, first.id).await.unwrap());

        let remaining = f.collections.list_active(f.user_id, DEFAULT_COLLECTION_LIMIT).await.unwrap();
        assert_eq!(remaining.len(), 1);

        // A removed collection can be collected again.
        assert!(f.collections.collect(f.user_id, a.id, None).await.is_ok());
    }

    #[test]
    fn test_collection_rate_rounding() {
        assert_eq!(collection_rate(0, 0), 0.0);
        assert_eq!(collection_rate(1, 3), 33.33);
        assert_eq!(collection_rate(3, 3), 100.0);
    }
}
