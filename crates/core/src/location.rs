use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use waypoint_common::{CityInfo, LocationContext, Result, WaypointError, WeatherInfo};

use crate::geo::validate_coordinates;

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub geocode_url: String,
    pub weather_base_url: String,
    pub openweather_api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            geocode_url: "https://api.bigdatacloud.net/data/reverse-geocode-client".to_string(),
            weather_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            openweather_api_key: None,
            timeout_seconds: 10,
        }
    }
}

impl LocationConfig {
    pub fn with_openweather_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.openweather_api_key = (!key.is_empty()).then_some(key);
        self
    }
}

/// Body of `POST /location/context`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_true")]
    pub include_weather: bool,
    #[serde(default = "default_true")]
    pub include_attractions: bool,
    #[serde(default = "default_true")]
    pub include_transportation: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub city: CityInfo,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub weather: WeatherInfo,
    /// Offset from UTC at the queried position, in seconds.
    pub utc_offset_seconds: Option<i32>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<GeocodedPlace>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<WeatherReport>;
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| WaypointError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// BigDataCloud's keyless reverse geocoding endpoint.
pub struct BigDataCloudGeocoder {
    client: reqwest::Client,
    url: String,
}

impl BigDataCloudGeocoder {
    pub fn new(config: &LocationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            url: config.geocode_url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BigDataCloudResponse {
    city: Option<String>,
    locality: Option<String>,
    principal_subdivision: Option<String>,
    country_name: Option<String>,
    country_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    locality_info: Option<LocalityInfo>,
}

#[derive(Debug, Deserialize)]
struct LocalityInfo {
    #[serde(default)]
    administrative: Vec<AdministrativeArea>,
}

#[derive(Debug, Deserialize)]
struct AdministrativeArea {
    timezone: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl BigDataCloudResponse {
    fn into_place(self, latitude: f64, longitude: f64) -> GeocodedPlace {
        let timezone = self
            .locality_info
            .and_then(|info| info.administrative.into_iter().next())
            .and_then(|area| non_empty(area.timezone))
            .unwrap_or_else(|| "UTC".to_string());

        let city = CityInfo {
            name: non_empty(self.city)
                .or_else(|| non_empty(self.locality))
                .or_else(|| non_empty(self.principal_subdivision))
                .unwrap_or_else(|| "Unknown City".to_string()),
            country: non_empty(self.country_name).unwrap_or_else(|| "Unknown Country".to_string()),
            country_code: non_empty(self.country_code).unwrap_or_else(|| "XX".to_string()),
            latitude: self.latitude.unwrap_or(latitude),
            longitude: self.longitude.unwrap_or(longitude),
        };

        GeocodedPlace { city, timezone }
    }
}

#[async_trait]
impl ReverseGeocoder for BigDataCloudGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<GeocodedPlace> {
        debug!("Reverse geocoding {}, {}", latitude, longitude);

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("localityLanguage", "en".to_string()),
            ])
            .send()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Geocoding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WaypointError::Upstream(format!(
                "Geocoding API returned {}",
                response.status()
            )));
        }

        let body: BigDataCloudResponse = response
            .json()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Failed to parse geocoding response: {}", e)))?;

        Ok(body.into_place(latitude, longitude))
    }
}

/// OpenWeather current conditions in metric units.
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(config: &LocationConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            base_url: config.weather_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenWeatherResponse {
    main: OpenWeatherMain,
    #[serde(default)]
    weather: Vec<OpenWeatherCondition>,
    timezone: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherCondition {
    description: String,
    icon: String,
}

impl OpenWeatherResponse {
    fn into_report(self) -> Result<WeatherReport> {
        let condition = self
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| WaypointError::Upstream("Weather response has no conditions".to_string()))?;

        Ok(WeatherReport {
            weather: WeatherInfo {
                temperature: self.main.temp,
                description: condition.description,
                icon: condition.icon,
            },
            utc_offset_seconds: self.timezone,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<WeatherReport> {
        let response = self
            .client
            .get(format!("{}/weather", self.base_url))
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
                ("lang", "en".to_string()),
            ])
            .send()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Weather request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WaypointError::Upstream(format!(
                "Weather API returned {}",
                response.status()
            )));
        }

        let body: OpenWeatherResponse = response
            .json()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Failed to parse weather response: {}", e)))?;

        body.into_report()
    }
}

/// Merges reverse geocoding and current weather into a [`LocationContext`].
pub struct LocationService {
    geocoder: Arc<dyn ReverseGeocoder>,
    weather: Option<Arc<dyn WeatherProvider>>,
}

impl LocationService {
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        weather: Option<Arc<dyn WeatherProvider>>,
    ) -> Self {
        Self { geocoder, weather }
    }

    /// Real HTTP providers. Weather is disabled without an OpenWeather key.
    pub fn from_config(config: &LocationConfig) -> Result<Self> {
        let geocoder: Arc<dyn ReverseGeocoder> = Arc::new(BigDataCloudGeocoder::new(config)?);
        let weather = match &config.openweather_api_key {
            Some(key) => {
                Some(Arc::new(OpenWeatherClient::new(config, key.clone())?) as Arc<dyn WeatherProvider>)
            }
            None => {
                warn!("OPENWEATHER_API_KEY not set; location context will omit weather");
                None
            }
        };
        Ok(Self::new(geocoder, weather))
    }

    pub async fn get_context(&self, request: &LocationRequest) -> Result<LocationContext> {
        validate_coordinates(request.latitude, request.longitude)?;
        let (lat, lon) = (request.latitude, request.longitude);

        let geocode = self.geocoder.reverse_geocode(lat, lon);
        let weather = async {
            match (&self.weather, request.include_weather) {
                (Some(provider), true) => Some(provider.current_weather(lat, lon).await),
                _ => None,
            }
        };
        let (place, weather) = tokio::join!(geocode, weather);

        let place = place.unwrap_or_else(|e| {
            error!("Reverse geocoding failed, using fallback city: {}", e);
            GeocodedPlace {
                city: CityInfo::unknown(lat, lon),
                timezone: "UTC".to_string(),
            }
        });

        let report = match weather {
            Some(Ok(report)) => Some(report),
            Some(Err(e)) => {
                error!("Failed to get weather info: {}", e);
                None
            }
            None => None,
        };

        let local_time = format_local_time(report.as_ref().and_then(|r| r.utc_offset_seconds));

        Ok(LocationContext {
            city: place.city,
            weather: report.map(|r| r.weather),
            attractions: Vec::new(),
            transportation: Vec::new(),
            timezone: place.timezone,
            local_time,
        })
    }
}

fn format_local_time(utc_offset_seconds: Option<i32>) -> String {
    let now = Utc::now();
    match utc_offset_seconds.and_then(FixedOffset::east_opt) {
        Some(offset) => now.with_timezone(&offset).format(LOCAL_TIME_FORMAT).to_string(),
        None => now.format(LOCAL_TIME_FORMAT).to_string(),
    }
}
