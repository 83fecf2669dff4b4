//! Location context shared between the location service, which produces it,
//! and the voice prompts, which consume it.
//!
//! Clients may also push a context over the V2V socket, so every field is
//! lenient on input.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityInfo {
    #[serde(default = "default_city_name")]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

fn default_city_name() -> String {
    "your location".to_string()
}

impl Default for CityInfo {
    fn default() -> Self {
        Self {
            name: default_city_name(),
            country: String::new(),
            country_code: String::new(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl CityInfo {
    /// Placeholder used when reverse geocoding is unavailable.
    pub fn unknown(latitude: f64, longitude: f64) -> Self {
        Self {
            name: "Unknown City".to_string(),
            country: "Unknown Country".to_string(),
            country_code: "XX".to_string(),
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub temperature: f64,
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attraction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOption {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    #[serde(default)]
    pub city: CityInfo,
    #[serde(default)]
    pub weather: Option<WeatherInfo>,
    #[serde(default)]
    pub attractions: Vec<Attraction>,
    #[serde(default)]
    pub transportation: Vec<TransportOption>,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub local_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_context_deserializes() {
        let ctx: LocationContext =
            serde_json::from_value(serde_json::json!({"city": {"country": "KZ"}})).unwrap();
        assert_eq!(ctx.city.name, "your location");
        assert_eq!(ctx.city.country, "KZ");
        assert!(ctx.attractions.is_empty());
        assert!(ctx.weather.is_none());
    }

    #[test]
    fn test_unknown_city() {
        let city = CityInfo::unknown(51.1, 71.4);
        assert_eq!(city.name, "Unknown City");
        assert_eq!(city.country_code, "XX");
    }
}
