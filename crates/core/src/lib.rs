pub mod coins;
pub mod collections;
pub mod database;
pub mod geo;
pub mod location;
pub mod maps;
pub mod models;
pub mod speech;
pub mod users;

use std::sync::Arc;
use tracing::info;
use waypoint_common::Result;

use coins::CoinRepository;
use collections::CollectionRepository;
use database::{DatabaseConfig, DatabaseManager};
use location::{LocationConfig, LocationService};
use maps::MapRepository;
use speech::{SpeechKind, SpeechRepository};
use users::UserRepository;

/// Persistence and location services shared by every request handler.
pub struct AppCore {
    pub db: Arc<DatabaseManager>,
    pub users: UserRepository,
    pub maps: MapRepository,
    pub coins: CoinRepository,
    pub stt: SpeechRepository,
    pub tts: SpeechRepository,
    pub collections: CollectionRepository,
    pub location: Arc<LocationService>,
}

impl AppCore {
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let location = Arc::new(LocationService::from_config(&config.location_config)?);
        Self::with_location(config, location).await
    }

    /// Like [`AppCore::new`] but with a caller-supplied location service.
    pub async fn with_location(config: CoreConfig, location: Arc<LocationService>) -> Result<Self> {
        let db = Arc::new(DatabaseManager::new(config.database_config).await?);
        let pool = db.pool().clone();

        info!(
            "Core initialized (collection radius {} m)",
            config.collection_radius_m
        );

        Ok(Self {
            users: UserRepository::new(pool.clone()),
            maps: MapRepository::new(pool.clone()),
            coins: CoinRepository::new(pool.clone()),
            stt: SpeechRepository::new(pool.clone(), SpeechKind::Stt),
            tts: SpeechRepository::new(pool.clone(), SpeechKind::Tts),
            collections: CollectionRepository::new(pool, config.collection_radius_m),
            location,
            db,
        })
    }

    pub fn speech(&self, kind: SpeechKind) -> &SpeechRepository {
        match kind {
            SpeechKind::Stt => &self.stt,
            SpeechKind::Tts => &self.tts,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.db.close().await;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_config: DatabaseConfig,
    pub location_config: LocationConfig,
    pub collection_radius_m: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_config: DatabaseConfig::default(),
            location_config: LocationConfig::default(),
            collection_radius_m: geo::DEFAULT_COLLECTION_RADIUS_M,
        }
    }
}
