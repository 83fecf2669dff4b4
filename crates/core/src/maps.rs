use crate::database::{db_error, DatabaseUtils};
use crate::models::{Map, MapChanges, NewMap};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;
use waypoint_common::{Page, PageRequest, Result};

const MAP_COLUMNS: &str =
    "id, name, description, latitude, longitude, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct MapRepository {
    pool: SqlitePool,
}

impl MapRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, map: &NewMap) -> Result<Map> {
        map.validate()?;

        let created = sqlx::query_as::<_, Map>(&format!(
            "INSERT INTO maps (name, description, latitude, longitude, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
            MAP_COLUMNS
        ))
        .bind(&map.name)
        .bind(&map.description)
        .bind(map.latitude)
        .bind(map.longitude)
        .bind(map.is_active)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create map", e))?;

        info!("Created map {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Map>> {
        sqlx::query_as::<_, Map>(&format!("SELECT {} FROM maps WHERE id = ?", MAP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load map", e))
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<Map>> {
        self.fetch_page(None, page).await
    }

    /// Substring match over name and description.
    pub async fn search(&self, term: &str, page: PageRequest) -> Result<Page<Map>> {
        self.fetch_page(Some(term), page).await
    }

    async fn fetch_page(&self, term: Option<&str>, page: PageRequest) -> Result<Page<Map>> {
        let pattern = term.map(DatabaseUtils::contains_pattern);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM maps WHERE 1 = 1");
        push_search(&mut count, pattern.as_deref());
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count maps", e))?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM maps WHERE 1 = 1", MAP_COLUMNS));
        push_search(&mut select, pattern.as_deref());
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let maps = select
            .build_query_as::<Map>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list maps", e))?;

        Ok(Page::new(maps, total, page))
    }

    pub async fn update(&self, id: i64, changes: &MapChanges) -> Result<Option<Map>> {
        changes.validate()?;

        sqlx::query_as::<_, Map>(&format!(
            "UPDATE maps SET \
                name = COALESCE(?, name), \
                description = COALESCE(?, description), \
                latitude = COALESCE(?, latitude), \
                longitude = COALESCE(?, longitude), \
                is_active = COALESCE(?, is_active), \
                updated_at = ? \
             WHERE id = ? RETURNING {}",
            MAP_COLUMNS
        ))
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.latitude)
        .bind(changes.longitude)
        .bind(changes.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update map", e))
    }

    /// Removes the map and, through the foreign key, its coins.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM maps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete map", e))?;

        if result.rows_affected() > 0 {
            info!("Deleted map {}", id);
        }
        Ok(result.rows_affected() > 0)
    }
}

fn push_search<'a>(builder: &mut QueryBuilder<'a, Sqlite>, pattern: Option<&'a str>) {
    if let Some(pattern) = pattern {
        builder
            .push(" AND (name LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\' OR description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}
