use crate::audio::AudioFormat;
use crate::config::VoiceConfig;
use crate::prompts::Language;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use waypoint_common::{Result, WaypointError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// `language` overrides the provider's configured recognition language.
    async fn transcribe(&self, audio_data: &[u8], language: Option<Language>) -> Result<String>;
    async fn health_check(&self) -> Result<()>;
    async fn supported_languages(&self) -> Result<Vec<String>>;
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| WaypointError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// OpenAI Whisper transcription over `/audio/transcriptions`.
pub struct WhisperStt {
    api_key: String,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperStt {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.openai.api_key.clone(),
            api_base: config.openai.api_base.trim_end_matches('/').to_string(),
            model: config.openai.stt_model.clone(),
            client: http_client(config.timeout_seconds)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SpeechToText for WhisperStt {
    async fn transcribe(&self, audio_data: &[u8], language: Option<Language>) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(WaypointError::Configuration(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let format = AudioFormat::detect(audio_data);
        debug!(
            "Transcribing {} bytes of {:?} audio with {}",
            audio_data.len(),
            format,
            self.model
        );

        let file = reqwest::multipart::Part::bytes(audio_data.to_vec())
            .file_name(format!("audio.{}", format.extension()))
            .mime_str(format.mime_type())
            .map_err(|e| WaypointError::VoiceProcessing(format!("Invalid audio mime type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());
        if let Some(language) = language {
            form = form.text("language", language.code());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WaypointError::Upstream(format!("STT request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(WaypointError::Upstream(format!("STT API error: {}", error_text)));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Failed to parse STT response: {}", e)))?;

        let transcript = result.text.trim().to_string();
        info!("Transcription completed: '{}'", transcript);
        Ok(transcript)
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(WaypointError::Configuration(
                "OpenAI API key not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(["kk", "ru", "en", "de", "fr", "es", "tr", "zh"]
            .iter()
            .map(|l| l.to_string())
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AzureRecognition {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

impl AzureRecognition {
    fn into_transcript(self) -> Result<String> {
        match self.recognition_status.as_str() {
            "Success" => Ok(self.display_text.unwrap_or_default().trim().to_string()),
            "NoMatch" | "InitialSilenceTimeout" => Ok(String::new()),
            other => Err(WaypointError::Upstream(format!("STT failed: {}", other))),
        }
    }
}

fn azure_locale(language: Language) -> &'static str {
    match language {
        Language::Kazakh => "kk-KZ",
        Language::Russian => "ru-RU",
        Language::English => "en-US",
    }
}

/// Azure short-audio recognition over the speech REST endpoint.
pub struct AzureStt {
    key: String,
    endpoint: String,
    locale: String,
    client: reqwest::Client,
}

impl AzureStt {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        Ok(Self {
            key: config.azure.key.clone(),
            endpoint: format!(
                "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
                config.azure.region
            ),
            locale: config.azure.locale.clone(),
            client: http_client(config.timeout_seconds)?,
        })
    }

    fn content_type(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Wav => "audio/wav; codecs=audio/pcm; samplerate=16000",
            AudioFormat::WebM => "audio/webm; codecs=opus",
            _ => "audio/ogg; codecs=opus",
        }
    }

    /// Explicit language wins over the configured default locale.
    fn locale_for(&self, language: Option<Language>) -> &str {
        match language {
            Some(language) => azure_locale(language),
            None => self.locale.as_str(),
        }
    }
}

#[async_trait]
impl SpeechToText for AzureStt {
    async fn transcribe(&self, audio_data: &[u8], language: Option<Language>) -> Result<String> {
        if self.key.is_empty() {
            return Err(WaypointError::Configuration(
                "Azure speech key not configured".to_string(),
            ));
        }

        let locale = self.locale_for(language);
        let format = AudioFormat::detect(audio_data);
        debug!("Azure STT: {} bytes, {:?}, {}", audio_data.len(), format, locale);

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("language", locale), ("format", "simple")])
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", Self::content_type(format))
            .header("Accept", "application/json")
            .body(audio_data.to_vec())
            .send()
            .await
            .map_err(|e| WaypointError::Upstream(format!("STT request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WaypointError::Upstream(format!(
                "STT failed: {} - {}",
                status, error_text
            )));
        }

        let recognition: AzureRecognition = response
            .json()
            .await
            .map_err(|e| WaypointError::Upstream(format!("Failed to parse STT response: {}", e)))?;

        let transcript = recognition.into_transcript()?;
        if transcript.is_empty() {
            warn!("Azure STT recognised no speech");
        }
        Ok(transcript)
    }

    async fn health_check(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(WaypointError::Configuration(
                "Azure speech key not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(vec![self.locale.clone()])
    }
}
