use crate::audio::{encode_base64, AudioProcessor};
use crate::lipsync::{self, LipSyncData};
use crate::llm::ResponseChain;
use crate::prompts::Language;
use crate::session::TurnContext;
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use waypoint_common::{Result, WaypointError};

#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub ai_response: String,
    pub audio_response: String,
    pub lip_sync_data: LipSyncData,
}

/// Audio in, reply text, speech and visemes out.
pub struct TurnPipeline {
    audio: AudioProcessor,
    stt: Arc<dyn SpeechToText>,
    chain: ResponseChain,
    tts: Arc<dyn TextToSpeech>,
}

impl TurnPipeline {
    pub fn new(
        audio: AudioProcessor,
        stt: Arc<dyn SpeechToText>,
        chain: ResponseChain,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        Self {
            audio,
            stt,
            chain,
            tts,
        }
    }

    pub fn chain(&self) -> &ResponseChain {
        &self.chain
    }

    pub fn stt(&self) -> &Arc<dyn SpeechToText> {
        &self.stt
    }

    pub fn tts(&self) -> &Arc<dyn TextToSpeech> {
        &self.tts
    }

    #[instrument(skip(self, audio_base64))]
    pub async fn transcribe(&self, audio_base64: &str, language: Language) -> Result<String> {
        let prepared = self.audio.prepare_base64(audio_base64)?;
        debug!("Prepared {} bytes as {}", prepared.data.len(), prepared.file_name());

        let transcript = self
            .stt
            .transcribe(&prepared.data, Some(language))
            .await?;

        if transcript.trim().is_empty() {
            return Err(WaypointError::BadRequest(
                "No speech detected in audio".to_string(),
            ));
        }
        Ok(transcript)
    }

    #[instrument(skip(self, user_input, context))]
    pub async fn respond(&self, user_input: &str, context: &TurnContext) -> Result<TurnOutput> {
        let ai_response = self
            .chain
            .respond(
                context.language,
                context.location.as_ref(),
                &context.history,
                user_input,
            )
            .await?;

        let audio = self.tts.synthesize(&ai_response, "").await?;
        let lip_sync_data = lipsync::generate(&ai_response, context.language);

        info!(
            "Turn completed: {} chars reply, {} bytes audio",
            ai_response.len(),
            audio.len()
        );

        Ok(TurnOutput {
            audio_response: encode_base64(&audio),
            ai_response,
            lip_sync_data,
        })
    }
}
