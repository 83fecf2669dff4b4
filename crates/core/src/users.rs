use crate::database::db_error;
use crate::models::{NewUser, User, UserChanges};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};
use waypoint_common::{Page, PageRequest, Result, WaypointError};

pub const USERNAME_TAKEN: &str = "Username already registered";

const USER_COLUMNS: &str = "id, username, hashed_password, first_name, last_name, is_active, is_deleted, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &NewUser) -> Result<User> {
        user.validate()?;

        let now = Utc::now();
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, hashed_password, first_name, last_name, is_active, is_deleted, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, 0, ?, ?) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                WaypointError::BadRequest(USERNAME_TAKEN.to_string())
            }
            other => db_error("Failed to create user", other),
        })?;

        info!("Created user {} ({})", created.username, created.id);
        Ok(created)
    }

    /// Looks up a user that has not been soft-deleted.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ? AND is_deleted = 0",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load user", e))
    }

    /// Looks up by username, including soft-deleted rows, since the name
    /// stays reserved.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load user", e))
    }

    pub async fn list(&self, page: PageRequest, is_active: Option<bool>) -> Result<Page<User>> {
        debug!("Listing users page={} size={} is_active={:?}", page.page, page.size, is_active);

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users WHERE is_deleted = 0");
        push_active_filter(&mut count, is_active);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count users", e))?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM users WHERE is_deleted = 0",
            USER_COLUMNS
        ));
        push_active_filter(&mut select, is_active);
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let users = select
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list users", e))?;

        Ok(Page::new(users, total, page))
    }

    pub async fn update(&self, id: i64, changes: &UserChanges) -> Result<Option<User>> {
        changes.validate()?;

        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                first_name = COALESCE(?, first_name), \
                last_name = COALESCE(?, last_name), \
                is_active = COALESCE(?, is_active), \
                updated_at = ? \
             WHERE id = ? AND is_deleted = 0 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(changes.is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update user", e))
    }

    /// Marks the user deleted and inactive. Returns false if no live user matched.
    pub async fn soft_delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_deleted = 1, is_active = 0, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete user", e))?;

        if result.rows_affected() > 0 {
            info!("Soft-deleted user {}", id);
        }
        Ok(result.rows_affected() > 0)
    }
}

fn push_active_filter(builder: &mut QueryBuilder<'_, Sqlite>, is_active: Option<bool>) {
    if let Some(active) = is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
}
