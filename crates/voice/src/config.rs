use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub openai: OpenAiConfig,
    pub groq: GroqConfig,
    pub azure: AzureSpeechConfig,
    pub audio: AudioConfig,
    pub llm: LlmConfig,
    pub voice_chat: VoiceChatConfig,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub tts_model: String,
    pub stt_model: String,
    pub tts_voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroqConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureSpeechConfig {
    pub key: String,
    pub region: String,
    pub locale: String,
    pub voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub max_duration_seconds: u32,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Number of past exchanges sent along with each request.
    pub history_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceChatConfig {
    pub model: String,
    pub system_prompt: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::default(),
            groq: GroqConfig::default(),
            azure: AzureSpeechConfig::default(),
            audio: AudioConfig::default(),
            llm: LlmConfig::default(),
            voice_chat: VoiceChatConfig::default(),
            timeout_seconds: 30,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            tts_model: "tts-1".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_voice: "alloy".to_string(),
        }
    }
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-70b-versatile".to_string(),
        }
    }
}

impl Default for AzureSpeechConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            region: String::new(),
            locale: "kk-KZ".to_string(),
            voice: "kk-KZ-AigulNeural".to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            max_duration_seconds: 300,
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
            history_window: 10,
        }
    }
}

impl Default for VoiceChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            system_prompt:
                "You are an expert tourism guide for Astana. Reply concisely in the user's language."
                    .to_string(),
        }
    }
}

impl VoiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_openai_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.openai.api_key = api_key.into();
        self
    }

    pub fn with_groq_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.groq.api_key = api_key.into();
        self
    }

    pub fn with_azure_speech(mut self, key: impl Into<String>, region: impl Into<String>) -> Self {
        self.azure.key = key.into();
        self.azure.region = region.into();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.openai.chat_model = model.into();
        self
    }

    pub fn with_groq_model(mut self, model: impl Into<String>) -> Self {
        self.groq.model = model.into();
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn has_openai(&self) -> bool {
        !self.openai.api_key.is_empty()
    }

    pub fn has_groq(&self) -> bool {
        !self.groq.api_key.is_empty()
    }

    pub fn has_azure(&self) -> bool {
        !self.azure.key.is_empty() && !self.azure.region.is_empty()
    }

    /// Missing provider keys are allowed; those providers fail per request.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_seconds == 0 {
            return Err("Timeout must be greater than zero".to_string());
        }

        if self.audio.sample_rate == 0 {
            return Err("Invalid sample rate".to_string());
        }

        if self.audio.max_bytes == 0 || self.audio.max_duration_seconds == 0 {
            return Err("Audio limits must be greater than zero".to_string());
        }

        if self.llm.max_tokens == 0 {
            return Err("max_tokens must be greater than zero".to_string());
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err("temperature must be between 0 and 2".to_string());
        }

        if !self.azure.key.is_empty() && self.azure.region.is_empty() {
            return Err("Azure speech region is required when a key is set".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VoiceConfig::new();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.openai.chat_model, "gpt-4o-mini");
        assert_eq!(config.groq.api_base, "https://api.groq.com/openai/v1");
        assert_eq!(config.azure.voice, "kk-KZ-AigulNeural");
        assert!(!config.has_openai());
        assert!(!config.has_azure());
    }

    #[test]
    fn test_config_builder() {
        let config = VoiceConfig::new()
            .with_openai_api_key("sk-test")
            .with_groq_api_key("gsk-test")
            .with_azure_speech("azure-key", "westeurope")
            .with_chat_model("gpt-4o");

        assert!(config.has_openai());
        assert!(config.has_groq());
        assert!(config.has_azure());
        assert_eq!(config.openai.chat_model, "gpt-4o");
    }

    #[test]
    fn test_config_validation() {
        assert!(VoiceConfig::new().validate().is_ok());

        let config = VoiceConfig::new().with_timeout_seconds(0);
        assert!(config.validate().is_err());

        let mut config = VoiceConfig::new();
        config.azure.key = "key".to_string();
        assert!(config.validate().is_err());

        let mut config = VoiceConfig::new();
        config.llm.temperature = 3.0;
        assert!(config.validate().is_err());
    }
}
