pub mod audio;
pub mod config;
pub mod lipsync;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod protocol;
pub mod service;
pub mod session;
pub mod stt;
pub mod tts;
pub mod voice_chat;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use waypoint_common::{Result, WaypointError};

pub use config::VoiceConfig;
pub use prompts::Language;
pub use protocol::{ClientMessage, ServerMessage};
pub use service::V2vService;
pub use voice_chat::{VoiceChatReply, VoiceChatService};

/// Both voice surfaces, built from one configuration.
#[derive(Clone)]
pub struct VoiceService {
    config: VoiceConfig,
    v2v: V2vService,
    voice_chat: VoiceChatService,
}

impl VoiceService {
    pub fn new(config: VoiceConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| WaypointError::Configuration(format!("Invalid voice config: {}", e)))?;

        if !config.has_groq() && !config.has_openai() {
            warn!("No chat provider key configured; voice turns will fail");
        }
        if !config.has_azure() {
            warn!("Azure speech not configured; binary voice chat will fail");
        }

        let v2v = V2vService::new(&config)?;
        let voice_chat = VoiceChatService::new(&config)?;
        info!("Voice service initialized");

        Ok(Self {
            config,
            v2v,
            voice_chat,
        })
    }

    pub fn from_parts(config: VoiceConfig, v2v: V2vService, voice_chat: VoiceChatService) -> Self {
        Self {
            config,
            v2v,
            voice_chat,
        }
    }

    pub fn v2v(&self) -> &V2vService {
        &self.v2v
    }

    pub fn voice_chat(&self) -> &VoiceChatService {
        &self.voice_chat
    }

    pub fn get_config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Reports which providers are configured. No network calls.
    pub fn health_check(&self) -> VoiceHealthStatus {
        VoiceHealthStatus {
            stt_available: self.config.has_openai(),
            tts_available: self.config.has_openai(),
            chat_available: self.config.has_groq() || self.config.has_openai(),
            azure_available: self.config.has_azure(),
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceHealthStatus {
    pub stt_available: bool,
    pub tts_available: bool,
    pub chat_available: bool,
    pub azure_available: bool,
    pub last_check: DateTime<Utc>,
}
