use crate::config::VoiceConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use waypoint_common::{Result, WaypointError};

const MAX_TTS_INPUT_CHARS: usize = 4096;
const OPENAI_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Returns mp3 audio. An empty `voice_id` selects the configured voice.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
    async fn health_check(&self) -> Result<()>;
    async fn available_voices(&self) -> Result<Vec<String>>;
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| WaypointError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Truncates on a char boundary and marks the cut with an ellipsis.
pub(crate) fn truncate_input(text: &str) -> String {
    match text.char_indices().nth(MAX_TTS_INPUT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub struct OpenAiTts {
    api_key: String,
    api_base: String,
    model: String,
    voice: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.openai.api_key.clone(),
            api_base: config.openai.api_base.trim_end_matches('/').to_string(),
            model: config.openai.tts_model.clone(),
            voice: config.openai.tts_voice.clone(),
            client: http_client(config.timeout_seconds)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        if self.api_key.is_empty() {
            return Err(WaypointError::Configuration(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let voice = if voice_id.is_empty() { &self.voice } else { voice_id };
        debug!("Synthesizing {} chars with {} ({})", text.chars().count(), self.model, voice);

        let request_body = json!({
            "model": self.model,
            "input": truncate_input(text),
            "voice": voice,
            "response_format": "mp3",
            "speed": 1.0
        });

        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| WaypointError::Upstream(format!("TTS request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(WaypointError::Upstream(format!("TTS API error: {}", error_text)));
        }

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Failed to read TTS response: {}", e)))?;

        info!("Speech synthesis completed: {} bytes", audio_data.len());
        Ok(audio_data.to_vec())
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(WaypointError::Configuration(
                "OpenAI API key not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn available_voices(&self) -> Result<Vec<String>> {
        Ok(OPENAI_VOICES.iter().map(|v| v.to_string()).collect())
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn build_ssml(locale: &str, voice: &str, text: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{locale}'><voice xml:lang='{locale}' name='{voice}'>{}</voice></speak>",
        escape_xml(text)
    )
}

/// Azure neural voices over the speech REST endpoint; always mp3.
pub struct AzureTts {
    key: String,
    endpoint: String,
    locale: String,
    voice: String,
    client: reqwest::Client,
}

impl AzureTts {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        Ok(Self {
            key: config.azure.key.clone(),
            endpoint: format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                config.azure.region
            ),
            locale: config.azure.locale.clone(),
            voice: config.azure.voice.clone(),
            client: http_client(config.timeout_seconds)?,
        })
    }
}

#[async_trait]
impl TextToSpeech for AzureTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        if self.key.is_empty() {
            return Err(WaypointError::Configuration(
                "Azure speech key not configured".to_string(),
            ));
        }

        let voice = if voice_id.is_empty() { &self.voice } else { voice_id };
        let ssml = build_ssml(&self.locale, voice, text);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "audio-16khz-32kbitrate-mono-mp3")
            .header("User-Agent", "waypoint")
            .body(ssml)
            .send()
            .await
            .map_err(|e| WaypointError::Upstream(format!("TTS request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WaypointError::Upstream(format!(
                "TTS failed: {} - {}",
                status, error_text
            )));
        }

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Failed to read TTS response: {}", e)))?;

        info!("Azure synthesis completed: {} bytes", audio_data.len());
        Ok(audio_data.to_vec())
    }

    async fn health_check(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(WaypointError::Configuration(
                "Azure speech key not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn available_voices(&self) -> Result<Vec<String>> {
        Ok(vec![self.voice.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_input() {
        assert_eq!(truncate_input("short"), "short");

        let long = "ә".repeat(MAX_TTS_INPUT_CHARS + 10);
        let truncated = truncate_input(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), MAX_TTS_INPUT_CHARS + 3);

        let exact = "a".repeat(MAX_TTS_INPUT_CHARS);
        assert_eq!(truncate_input(&exact), exact);
    }

    #[test]
    fn test_ssml_escapes_text() {
        let ssml = build_ssml("kk-KZ", "kk-KZ-AigulNeural", "Tom & Jerry <3");
        assert!(ssml.contains("name='kk-KZ-AigulNeural'"));
        assert!(ssml.contains("Tom &amp; Jerry &lt;3"));
        assert!(!ssml.contains("<3"));
    }

    #[tokio::test]
    async fn test_missing_keys_fail_fast() {
        let config = VoiceConfig::default();

        let openai = OpenAiTts::new(&config).unwrap();
        assert!(openai.synthesize("hi", "").await.is_err());
        assert_eq!(openai.available_voices().await.unwrap().len(), 6);

        let azure = AzureTts::new(&config).unwrap();
        assert!(matches!(
            azure.synthesize("hi", "").await,
            Err(WaypointError::Configuration(_))
        ));
    }
}
