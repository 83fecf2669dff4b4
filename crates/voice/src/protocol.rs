//! JSON frames exchanged over the voice-to-voice socket.

use crate::lipsync::LipSyncData;
use crate::session::ConversationTurn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_common::LocationContext;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    VoiceInput {
        #[serde(default)]
        audio_data: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    TextInput {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        location_context: Option<LocationContext>,
        #[serde(default)]
        language: Option<String>,
    },
    Ping,
    GetHistory,
    ClearHistory,
    GetLipSyncData {
        #[serde(default)]
        text: Option<String>,
    },
    LocationContext {
        #[serde(default)]
        location_context: Option<LocationContext>,
    },
}

const KNOWN_TYPES: [&str; 7] = [
    "voice_input",
    "text_input",
    "ping",
    "get_history",
    "clear_history",
    "get_lip_sync_data",
    "location_context",
];

impl ClientMessage {
    /// Parses one text frame. The error is the message to send back.
    pub fn parse(frame: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(frame).map_err(|_| "Invalid JSON format".to_string())?;

        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => other.to_string(),
            None => "null".to_string(),
        };
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(format!("Unknown message type: {}", kind));
        }

        serde_json::from_value(value).map_err(|_| "Invalid JSON format".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionStatus {
        status: String,
        message: String,
    },
    ProcessingStatus {
        status: String,
        message: String,
    },
    VoiceResponse {
        transcript: String,
        ai_response: String,
        audio_response: String,
        lip_sync_data: LipSyncData,
        timestamp: DateTime<Utc>,
    },
    Pong,
    ConversationHistory {
        history: Vec<ConversationTurn>,
    },
    HistoryCleared {
        message: String,
    },
    #[serde(rename = "lip_sync_data")]
    LipSync {
        text: String,
        lip_sync_data: LipSyncData,
    },
    LocationContext {
        location_context: LocationContext,
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn connected() -> Self {
        ServerMessage::ConnectionStatus {
            status: "connected".to_string(),
            message: "V2V connection established".to_string(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        ServerMessage::ProcessingStatus {
            status: "processing".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerMessage::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"Failed to encode message: {}"}}"#,
                e
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#), Ok(ClientMessage::Ping));

        let msg = ClientMessage::parse(r#"{"type":"text_input","text":"hi","language":"en"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::TextInput {
                text: Some("hi".to_string()),
                location_context: None,
                language: Some("en".to_string()),
            }
        );

        let msg = ClientMessage::parse(r#"{"type":"voice_input"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::VoiceInput { audio_data: None, .. }));
    }

    #[test]
    fn test_parse_location_context() {
        let frame = r#"{"type":"location_context","location_context":{"city":{"name":"Astana","country":"Kazakhstan"},"timezone":"Asia/Almaty"}}"#;
        match ClientMessage::parse(frame).unwrap() {
            ClientMessage::LocationContext {
                location_context: Some(ctx),
            } => {
                assert_eq!(ctx.city.name, "Astana");
                assert_eq!(ctx.timezone, "Asia/Almaty");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ClientMessage::parse("not json"),
            Err("Invalid JSON format".to_string())
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#),
            Err("Unknown message type: dance".to_string())
        );
        assert_eq!(
            ClientMessage::parse(r#"{"text":"hi"}"#),
            Err("Unknown message type: null".to_string())
        );
    }

    #[test]
    fn test_server_message_shape() {
        let json: Value = serde_json::from_str(&ServerMessage::connected().to_json()).unwrap();
        assert_eq!(json["type"], "connection_status");
        assert_eq!(json["status"], "connected");

        let json: Value = serde_json::from_str(&ServerMessage::Pong.to_json()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong"}));

        let lip = crate::lipsync::generate("hi", crate::prompts::Language::Kazakh);
        let json: Value = serde_json::from_str(
            &ServerMessage::LipSync {
                text: "hi".to_string(),
                lip_sync_data: lip,
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(json["type"], "lip_sync_data");
        assert_eq!(json["lip_sync_data"]["type"], "visemes");
    }
}
