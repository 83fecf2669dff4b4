use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use waypoint_common::{Result, WaypointError};

use crate::geo::validate_coordinates;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PERSON_NAME_MAX_LEN: usize = 50;
pub const MAP_NAME_MAX_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Map {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMap {
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Coin {
    pub id: i64,
    pub map_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub ar_model_url: Option<String>,
    pub ar_scale: f64,
    pub ar_position_x: f64,
    pub ar_position_y: f64,
    pub ar_position_z: f64,
    pub is_collected: bool,
    pub collected_by_id: Option<i64>,
    pub collected_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCoin {
    pub map_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub ar_model_url: Option<String>,
    pub ar_scale: Option<f64>,
    pub ar_position_x: Option<f64>,
    pub ar_position_y: Option<f64>,
    pub ar_position_z: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoinChanges {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub ar_model_url: Option<String>,
    pub ar_scale: Option<f64>,
    pub ar_position_x: Option<f64>,
    pub ar_position_y: Option<f64>,
    pub ar_position_z: Option<f64>,
    pub is_collected: Option<bool>,
    pub collected_by_id: Option<i64>,
    pub collected_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// A coin annotated with its distance from a query point.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyCoin {
    #[serde(flatten)]
    pub coin: Coin,
    pub distance_m: f64,
}

/// A row of the `stt` or `tts` table.
#[derive(Debug, Clone, FromRow)]
pub struct SpeechRecord {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub audio: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CoinCollection {
    pub id: i64,
    pub user_id: i64,
    pub coin_id: i64,
    pub collected_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub total_collected: i64,
    pub unique_coins: i64,
    pub collection_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub user_id: i64,
    pub stats: CollectionStats,
    pub recent_collections: Vec<CoinCollection>,
}

fn default_true() -> bool {
    true
}

pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(WaypointError::Validation(format!(
            "username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    Ok(())
}

fn validate_person_name(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > PERSON_NAME_MAX_LEN => Err(WaypointError::Validation(
            format!("{} must be at most {} characters", field, PERSON_NAME_MAX_LEN),
        )),
        _ => Ok(()),
    }
}

fn validate_map_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAP_NAME_MAX_LEN {
        return Err(WaypointError::Validation(format!(
            "name must be between 1 and {} characters",
            MAP_NAME_MAX_LEN
        )));
    }
    Ok(())
}

fn validate_optional_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<()> {
    validate_coordinates(latitude.unwrap_or(0.0), longitude.unwrap_or(0.0))
}

impl NewUser {
    pub fn validate(&self) -> Result<()> {
        validate_username(&self.username)?;
        validate_person_name("first_name", self.first_name.as_deref())?;
        validate_person_name("last_name", self.last_name.as_deref())
    }
}

impl UserChanges {
    pub fn validate(&self) -> Result<()> {
        validate_person_name("first_name", self.first_name.as_deref())?;
        validate_person_name("last_name", self.last_name.as_deref())
    }
}

impl NewMap {
    pub fn validate(&self) -> Result<()> {
        validate_map_name(&self.name)?;
        validate_coordinates(self.latitude, self.longitude)
    }
}

impl MapChanges {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_map_name(name)?;
        }
        validate_optional_coordinates(self.latitude, self.longitude)
    }
}

impl NewCoin {
    pub fn validate(&self) -> Result<()> {
        validate_coordinates(self.latitude, self.longitude)
    }
}

impl CoinChanges {
    pub fn validate(&self) -> Result<()> {
        validate_optional_coordinates(self.latitude, self.longitude)
    }
}
