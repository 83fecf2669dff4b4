use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use waypoint_api::{ApiServer, AppState, AuthService};
use waypoint_core::AppCore;
use waypoint_voice::VoiceService;

mod settings;

use settings::Settings;

const DEFAULT_LOG_FILTER: &str = "waypoint=debug,tower_http=debug,axum=debug";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    // LOG_FORMAT=json for log shippers; human-readable otherwise.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting Waypoint API v{}...", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;

    let core = Arc::new(AppCore::new(settings.core_config()).await?);
    let voice = VoiceService::new(settings.voice.clone())?;
    let auth = Arc::new(AuthService::new(settings.auth.clone()));

    let state = AppState::new(core, voice, auth);
    let server = ApiServer::new(settings.server.clone(), state);

    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
