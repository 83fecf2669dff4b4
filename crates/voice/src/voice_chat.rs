use crate::config::VoiceConfig;
use crate::llm::{ChatModel, OpenAiCompatibleChat};
use crate::stt::{AzureStt, SpeechToText};
use crate::tts::{AzureTts, TextToSpeech};
use std::sync::Arc;
use tracing::{debug, info};
use waypoint_common::{Result, WaypointError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceChatReply {
    /// Nothing was recognised in the utterance.
    Silence,
    Audio(Vec<u8>),
}

/// One binary utterance in, one mp3 reply out. Stateless between frames.
#[derive(Clone)]
pub struct VoiceChatService {
    stt: Arc<dyn SpeechToText>,
    chat: Arc<dyn ChatModel>,
    tts: Arc<dyn TextToSpeech>,
    persona: String,
}

impl VoiceChatService {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        Ok(Self::with_providers(
            Arc::new(AzureStt::new(config)?),
            Arc::new(OpenAiCompatibleChat::voice_chat(config)),
            Arc::new(AzureTts::new(config)?),
            config.voice_chat.system_prompt.clone(),
        ))
    }

    pub fn with_providers(
        stt: Arc<dyn SpeechToText>,
        chat: Arc<dyn ChatModel>,
        tts: Arc<dyn TextToSpeech>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            stt,
            chat,
            tts,
            persona: persona.into(),
        }
    }

    pub async fn reply(&self, utterance: &[u8]) -> Result<VoiceChatReply> {
        if utterance.is_empty() {
            return Err(WaypointError::BadRequest(
                "No audio data provided".to_string(),
            ));
        }

        let user_text = self.stt.transcribe(utterance, None).await?;
        if user_text.trim().is_empty() {
            debug!("Voice chat utterance had no recognisable speech");
            return Ok(VoiceChatReply::Silence);
        }

        let reply_text = self.chat.complete(&self.persona, &[], &user_text).await?;
        let audio = self.tts.synthesize(&reply_text, "").await?;

        info!(
            "Voice chat reply: {} chars, {} bytes of audio",
            reply_text.len(),
            audio.len()
        );
        Ok(VoiceChatReply::Audio(audio))
    }
}
