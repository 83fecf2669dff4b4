use crate::audio::{silent_wav, AudioProcessor};
use crate::config::VoiceConfig;
use crate::lipsync;
use crate::llm::{ChatModel, OpenAiCompatibleChat, ResponseChain};
use crate::pipeline::TurnPipeline;
use crate::prompts::Language;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{ConversationTurn, SessionManager, TurnContext, TurnKind, TurnRejection};
use crate::stt::WhisperStt;
use crate::tts::OpenAiTts;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};
use waypoint_common::{LocationContext, Result, WaypointError};

const BUSY_MESSAGE: &str = "Already processing a request. Please wait.";
const STT_PROBE_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredModels {
    pub gpt: String,
    pub tts: String,
    pub stt: String,
}

impl ConfiguredModels {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            gpt: config.openai.chat_model.clone(),
            tts: config.openai.tts_model.clone(),
            stt: config.openai.stt_model.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceStatus {
    pub status: String,
    pub openai_api_key_valid: bool,
    pub groq_api_key_valid: bool,
    pub active_connections: usize,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelTestResults {
    pub gpt_model: bool,
    pub tts_model: bool,
    pub stt_model: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalog {
    pub available_models: Vec<String>,
    pub configured_models: ConfiguredModels,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceStats {
    pub active_connections: usize,
    pub active_sessions: usize,
    pub total_conversations: usize,
    pub service_status: String,
}

enum TurnInput {
    Voice {
        audio_data: Option<String>,
        language: Option<String>,
    },
    Text {
        text: Option<String>,
        location_context: Option<LocationContext>,
        language: Option<String>,
    },
}

impl TurnInput {
    fn label(&self) -> &'static str {
        match self {
            TurnInput::Voice { .. } => "voice input",
            TurnInput::Text { .. } => "text input",
        }
    }
}

fn session_language(code: Option<&str>) -> Language {
    Language::from_code(code.unwrap_or(Language::default().code()))
}

fn send(tx: &UnboundedSender<ServerMessage>, message: ServerMessage) {
    if tx.send(message).is_err() {
        debug!("V2V socket closed before the message was sent");
    }
}

/// Voice-to-voice conversations over a per-user socket.
#[derive(Clone)]
pub struct V2vService {
    sessions: SessionManager,
    pipeline: Arc<TurnPipeline>,
    models: ConfiguredModels,
}

impl V2vService {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let chain = ResponseChain::new(
            Arc::new(OpenAiCompatibleChat::groq(config)),
            Arc::new(OpenAiCompatibleChat::openai(config)),
        );
        let pipeline = TurnPipeline::new(
            AudioProcessor::new(&config.audio),
            Arc::new(WhisperStt::new(config)?),
            chain,
            Arc::new(OpenAiTts::new(config)?),
        );

        Ok(Self::with_pipeline(
            pipeline,
            ConfiguredModels::from_config(config),
        ))
    }

    pub fn with_pipeline(pipeline: TurnPipeline, models: ConfiguredModels) -> Self {
        Self {
            sessions: SessionManager::new(),
            pipeline: Arc::new(pipeline),
            models,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Registers the socket and greets it. The returned id scopes every
    /// later call from this socket.
    pub async fn connect(&self, user_id: i64, tx: &UnboundedSender<ServerMessage>) -> u64 {
        let connection_id = self.sessions.connect(user_id).await;
        send(tx, ServerMessage::connected());
        connection_id
    }

    pub async fn disconnect(&self, user_id: i64, connection_id: u64) {
        self.sessions.disconnect(user_id, connection_id).await;
    }

    pub async fn handle_message(
        &self,
        user_id: i64,
        connection_id: u64,
        frame: &str,
        tx: &UnboundedSender<ServerMessage>,
    ) {
        let message = match ClientMessage::parse(frame) {
            Ok(message) => message,
            Err(reason) => {
                warn!("Rejected V2V frame from user {}: {}", user_id, reason);
                send(tx, ServerMessage::error(reason));
                return;
            }
        };

        match message {
            ClientMessage::VoiceInput {
                audio_data,
                language,
            } => {
                let input = TurnInput::Voice {
                    audio_data,
                    language,
                };
                self.start_turn(user_id, connection_id, input, tx).await;
            }
            ClientMessage::TextInput {
                text,
                location_context,
                language,
            } => {
                let input = TurnInput::Text {
                    text,
                    location_context,
                    language,
                };
                self.start_turn(user_id, connection_id, input, tx).await;
            }
            ClientMessage::Ping => send(tx, ServerMessage::Pong),
            ClientMessage::GetHistory => {
                let history = self.sessions.history(user_id).await;
                send(tx, ServerMessage::ConversationHistory { history });
            }
            ClientMessage::ClearHistory => {
                self.sessions.clear_history(user_id).await;
                send(
                    tx,
                    ServerMessage::HistoryCleared {
                        message: "Conversation history cleared".to_string(),
                    },
                );
            }
            ClientMessage::GetLipSyncData { text } => match text.filter(|t| !t.is_empty()) {
                Some(text) => {
                    let language = self.sessions.language(user_id).await;
                    let lip_sync_data = lipsync::generate(&text, language);
                    send(tx, ServerMessage::LipSync { text, lip_sync_data });
                }
                None => send(
                    tx,
                    ServerMessage::error("No text provided for lip-sync generation"),
                ),
            },
            ClientMessage::LocationContext { location_context } => match location_context {
                Some(location_context) => {
                    self.sessions
                        .set_location(user_id, connection_id, location_context.clone())
                        .await;
                    info!(
                        "Updated location context for user {}: {}",
                        user_id, location_context.city.name
                    );
                    send(
                        tx,
                        ServerMessage::LocationContext {
                            location_context,
                            message: "Location context updated successfully".to_string(),
                        },
                    );
                }
                None => send(tx, ServerMessage::error("No location context provided")),
            },
        }
    }

    /// Claims the session's busy flag and runs the turn on its own task so
    /// the socket keeps reading.
    async fn start_turn(
        &self,
        user_id: i64,
        connection_id: u64,
        input: TurnInput,
        tx: &UnboundedSender<ServerMessage>,
    ) {
        match self.sessions.try_begin_turn(user_id, connection_id).await {
            Ok(()) => {}
            Err(TurnRejection::Busy) => {
                send(tx, ServerMessage::error(BUSY_MESSAGE));
                return;
            }
            Err(TurnRejection::NoSession) => {
                send(tx, ServerMessage::error("Session not found"));
                return;
            }
        }

        let label = input.label();
        send(tx, ServerMessage::processing(format!("Processing {}...", label)));

        let service = self.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = service.run_turn(user_id, connection_id, input).await;
            service.sessions.end_turn(user_id, connection_id).await;

            match result {
                Ok(response) => send(&tx, response),
                Err(e) => {
                    error!("Error processing {} for user {}: {}", label, user_id, e);
                    send(
                        &tx,
                        ServerMessage::error(format!("Error processing {}: {}", label, e.detail())),
                    );
                }
            }
        });
    }

    async fn turn_context(&self, user_id: i64, connection_id: u64) -> Result<TurnContext> {
        self.sessions
            .turn_context(user_id, connection_id)
            .await
            .ok_or_else(|| WaypointError::NotFound("Session not found".to_string()))
    }

    async fn run_turn(
        &self,
        user_id: i64,
        connection_id: u64,
        input: TurnInput,
    ) -> Result<ServerMessage> {
        let (transcript, kind, context) = match input {
            TurnInput::Voice {
                audio_data,
                language,
            } => {
                let audio = audio_data
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| WaypointError::BadRequest("No audio data provided".to_string()))?;
                self.sessions
                    .set_language(user_id, connection_id, session_language(language.as_deref()))
                    .await;

                let context = self.turn_context(user_id, connection_id).await?;
                let transcript = self.pipeline.transcribe(&audio, context.language).await?;
                (transcript, TurnKind::Voice, context)
            }
            TurnInput::Text {
                text,
                location_context,
                language,
            } => {
                let text = text
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| WaypointError::BadRequest("No text provided".to_string()))?;
                if let Some(location_context) = location_context {
                    self.sessions
                        .set_location(user_id, connection_id, location_context)
                        .await;
                }
                self.sessions
                    .set_language(user_id, connection_id, session_language(language.as_deref()))
                    .await;

                let context = self.turn_context(user_id, connection_id).await?;
                (text, TurnKind::Text, context)
            }
        };

        let output = self.pipeline.respond(&transcript, &context).await?;
        let timestamp = Utc::now();

        let recorded = self
            .sessions
            .record_turn(
                user_id,
                connection_id,
                ConversationTurn {
                    timestamp,
                    user_input: transcript.clone(),
                    ai_response: output.ai_response.clone(),
                    kind,
                },
            )
            .await;
        if !recorded {
            debug!("Session for user {} closed during the turn", user_id);
        }

        Ok(ServerMessage::VoiceResponse {
            transcript,
            ai_response: output.ai_response,
            audio_response: output.audio_response,
            lip_sync_data: output.lip_sync_data,
            timestamp,
        })
    }

    pub async fn status(&self) -> VoiceStatus {
        let chain = self.pipeline.chain();
        let (groq_valid, openai_valid) = tokio::join!(
            chain.primary().validate_api_key(),
            chain.fallback().validate_api_key()
        );
        let sessions = self.sessions.active_sessions().await;

        VoiceStatus {
            status: if groq_valid || openai_valid {
                "operational"
            } else {
                "error"
            }
            .to_string(),
            openai_api_key_valid: openai_valid,
            groq_api_key_valid: groq_valid,
            active_connections: sessions,
            active_sessions: sessions,
        }
    }

    /// Probes each model with a minimal real request.
    pub async fn test_models(&self) -> ModelTestResults {
        let gpt_model = self.pipeline.chain().primary().validate_api_key().await;

        let tts_model = match self.pipeline.tts().synthesize("Test", "").await {
            Ok(_) => true,
            Err(e) => {
                error!("TTS model test failed: {}", e);
                false
            }
        };

        let stt_model = match silent_wav(1, STT_PROBE_SAMPLE_RATE) {
            Ok(probe) => match self.pipeline.stt().transcribe(&probe, None).await {
                Ok(_) => true,
                Err(e) => {
                    error!("STT model test failed: {}", e);
                    false
                }
            },
            Err(e) => {
                error!("Failed to build STT probe audio: {}", e);
                false
            }
        };

        ModelTestResults {
            gpt_model,
            tts_model,
            stt_model,
        }
    }

    pub async fn models(&self) -> ModelCatalog {
        let available_models = self
            .pipeline
            .chain()
            .fallback()
            .list_models()
            .await
            .unwrap_or_else(|e| {
                error!("Error getting available models: {}", e);
                Vec::new()
            });

        ModelCatalog {
            available_models,
            configured_models: self.models.clone(),
        }
    }

    pub async fn stats(&self) -> VoiceStats {
        let sessions = self.sessions.active_sessions().await;
        VoiceStats {
            active_connections: sessions,
            active_sessions: sessions,
            total_conversations: self.sessions.total_conversations().await,
            service_status: "operational".to_string(),
        }
    }
}
