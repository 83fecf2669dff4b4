use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::warn;
use waypoint_api::{ApiConfig, AuthConfig};
use waypoint_core::database::DatabaseConfig;
use waypoint_core::geo::DEFAULT_COLLECTION_RADIUS_M;
use waypoint_core::location::LocationConfig;
use waypoint_core::CoreConfig;
use waypoint_voice::VoiceConfig;

/// Process configuration.
///
/// Sources, later ones winning: built-in defaults, `config/default.toml`,
/// `config/{RUN_MODE}.toml`, `WAYPOINT__SECTION__KEY` variables, then the
/// flat variables a `.env` file usually carries (`SECRET_KEY`, `PORT`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ApiConfig,
    pub auth: AuthConfig,
    pub database_url: String,
    pub collection_radius_m: f64,
    pub openweather_api_key: Option<String>,
    pub voice: VoiceConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ApiConfig::default(),
            auth: AuthConfig::default(),
            database_url: DatabaseConfig::default().database_url,
            collection_radius_m: DEFAULT_COLLECTION_RADIUS_M,
            openweather_api_key: None,
            voice: VoiceConfig::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let settings: Settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("WAYPOINT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        let settings = settings.with_overrides(|key| env::var(key).ok())?;
        if settings.auth.jwt_secret == AuthConfig::default().jwt_secret {
            warn!("SECRET_KEY not set; using the built-in development secret");
        }
        Ok(settings)
    }

    /// Applies the flat variables. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("PORT") {
            self.server.port = v.trim().parse().with_context(|| format!("Invalid PORT: {}", v))?;
        }
        if let Some(v) = var("BACKEND_CORS_ORIGINS") {
            self.server.cors_origins = parse_origins(&v);
        }

        if let Some(v) = var("SECRET_KEY") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.auth.access_token_expire_minutes = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid ACCESS_TOKEN_EXPIRE_MINUTES: {}", v))?;
        }
        if let Some(v) = var("REFRESH_TOKEN_EXPIRE_DAYS") {
            self.auth.refresh_token_expire_days = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid REFRESH_TOKEN_EXPIRE_DAYS: {}", v))?;
        }

        if let Some(v) = var("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = var("COLLECTION_RADIUS_M") {
            self.collection_radius_m = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid COLLECTION_RADIUS_M: {}", v))?;
        }
        if let Some(v) = var("OPENWEATHER_API_KEY") {
            self.openweather_api_key = Some(v);
        }

        let voice = &mut self.voice;
        for (key, slot) in [
            ("OPENAI_API_KEY", &mut voice.openai.api_key),
            ("OPENAI_MODEL", &mut voice.openai.chat_model),
            ("OPENAI_TTS_MODEL", &mut voice.openai.tts_model),
            ("OPENAI_STT_MODEL", &mut voice.openai.stt_model),
            ("GROQ_API_KEY", &mut voice.groq.api_key),
            ("GROQ_MODEL", &mut voice.groq.model),
            ("AZURE_SPEECH_KEY", &mut voice.azure.key),
            ("AZURE_SPEECH_REGION", &mut voice.azure.region),
            ("AZURE_SPEECH_LOCALE", &mut voice.azure.locale),
            ("AZURE_TTS_VOICE", &mut voice.azure.voice),
        ] {
            if let Some(v) = var(key) {
                *slot = v;
            }
        }

        Ok(self)
    }

    pub fn core_config(&self) -> CoreConfig {
        let location_config = match &self.openweather_api_key {
            Some(key) => LocationConfig::default().with_openweather_api_key(key.clone()),
            None => LocationConfig::default(),
        };

        CoreConfig {
            database_config: DatabaseConfig {
                database_url: self.database_url.clone(),
                ..DatabaseConfig::default()
            },
            location_config,
            collection_radius_m: self.collection_radius_m,
        }
    }
}

/// Accepts `a,b` as well as the JSON-ish `["a", "b"]` form.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|origin| origin.trim().trim_matches('"').trim_matches('\'').trim())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.auth.access_token_expire_minutes, 60);
        assert_eq!(settings.collection_radius_m, 50.0);
        assert!(settings.openweather_api_key.is_none());
        assert!(!settings.voice.has_openai());
    }

    #[test]
    fn test_flat_overrides() {
        let settings = Settings::default()
            .with_overrides(lookup(&[
                ("SECRET_KEY", "s3cret"),
                ("ACCESS_TOKEN_EXPIRE_MINUTES", "15"),
                ("PORT", "9100"),
                ("DATABASE_URL", "sqlite::memory:"),
                ("OPENAI_API_KEY", "sk-test"),
                ("AZURE_SPEECH_LOCALE", "ru-RU"),
                ("OPENWEATHER_API_KEY", "ow-key"),
                ("GROQ_API_KEY", ""),
            ]))
            .unwrap();

        assert_eq!(settings.auth.jwt_secret, "s3cret");
        assert_eq!(settings.auth.access_token_expire_minutes, 15);
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert!(settings.voice.has_openai());
        assert!(!settings.voice.has_groq());
        assert_eq!(settings.voice.azure.locale, "ru-RU");

        let core = settings.core_config();
        assert_eq!(core.database_config.database_url, "sqlite::memory:");
        assert_eq!(
            core.location_config.openweather_api_key.as_deref(),
            Some("ow-key")
        );
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let result = Settings::default().with_overrides(lookup(&[("PORT", "eighty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_cors_origin_forms() {
        assert_eq!(
            parse_origins("http://localhost:3000, https://app.example.com"),
            vec!["http://localhost:3000", "https://app.example.com"]
        );
        assert_eq!(
            parse_origins(r#"["http://localhost:3000","*"]"#),
            vec!["http://localhost:3000", "*"]
        );
        assert!(parse_origins("[]").is_empty());
    }

    #[test]
    #[serial]
    fn test_load_reads_prefixed_environment() {
        env::set_var("RUN_MODE", "settings-test");
        env::set_var("WAYPOINT__SERVER__RATE_LIMIT_REQUESTS_PER_MINUTE", "7");
        env::set_var("WAYPOINT__COLLECTION_RADIUS_M", "75");

        let settings = Settings::load();

        env::remove_var("RUN_MODE");
        env::remove_var("WAYPOINT__SERVER__RATE_LIMIT_REQUESTS_PER_MINUTE");
        env::remove_var("WAYPOINT__COLLECTION_RADIUS_M");

        let settings = settings.unwrap();
        assert_eq!(settings.server.rate_limit_requests_per_minute, 7);
        assert_eq!(settings.collection_radius_m, 75.0);
    }
}
