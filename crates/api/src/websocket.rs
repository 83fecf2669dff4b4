use crate::{auth::AuthService, AppState};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use waypoint_voice::{ServerMessage, V2vService, VoiceChatReply, VoiceChatService};

#[derive(Debug, Deserialize)]
pub struct V2vQuery {
    pub token: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/voice/ws/v2v/:user_id", get(v2v_handler))
        .route("/api/v1/voice/ws/voice-chat", get(voice_chat_handler))
}

/// The token must be a valid access token issued to `user_id`.
fn authorize_v2v(auth: &AuthService, token: Option<&str>, user_id: i64) -> Result<(), &'static str> {
    let token = token.ok_or("Missing token")?;
    let subject = auth.verify_access_token(token).map_err(|_| "Invalid token")?;
    if subject != user_id {
        return Err("Token does not match user");
    }
    Ok(())
}

async fn v2v_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<V2vQuery>,
) -> Response {
    let authorized = authorize_v2v(&state.auth, query.token.as_deref(), user_id);
    let v2v = state.voice.v2v().clone();

    ws.on_upgrade(move |socket| async move {
        match authorized {
            Ok(()) => handle_v2v_socket(socket, v2v, user_id).await,
            Err(reason) => {
                warn!("Refusing V2V socket for user {}: {}", user_id, reason);
                reject(socket, reason).await;
            }
        }
    })
}

async fn reject(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Cow::Borrowed(reason),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame: {}", e);
    }
}

async fn handle_v2v_socket(socket: WebSocket, v2v: V2vService, user_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = v2v.connect(user_id, &tx).await;
    info!("V2V connection {} established for user {}", connection_id, user_id);

    // Turns run on their own tasks and report through `tx`.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message.to_json())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                v2v.handle_message(user_id, connection_id, &text, &tx).await;
            }
            Ok(Message::Binary(data)) => {
                debug!("Ignoring {} byte binary frame on V2V socket", data.len());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("V2V socket error for user {}: {}", user_id, e);
                break;
            }
        }
    }

    v2v.disconnect(user_id, connection_id).await;
    send_task.abort();
    info!("V2V connection {} closed for user {}", connection_id, user_id);
}

async fn voice_chat_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let chat = state.voice.voice_chat().clone();
    ws.on_upgrade(move |socket| handle_voice_chat_socket(socket, chat))
}

async fn handle_voice_chat_socket(mut socket: WebSocket, chat: VoiceChatService) {
    info!("Voice chat connection established");

    while let Some(frame) = socket.recv().await {
        let reply = match frame {
            Ok(Message::Binary(utterance)) => voice_chat_frame(chat.reply(&utterance).await),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Voice chat socket error: {}", e);
                break;
            }
        };

        if socket.send(reply).await.is_err() {
            break;
        }
    }

    info!("Voice chat connection closed");
}

fn voice_chat_frame(reply: waypoint_common::Result<VoiceChatReply>) -> Message {
    match reply {
        Ok(VoiceChatReply::Silence) => Message::Text(String::new()),
        Ok(VoiceChatReply::Audio(mp3)) => Message::Binary(mp3),
        Err(e) => {
            error!("Voice chat turn failed: {}", e);
            Message::Text(format!("ERROR: {}", e.detail()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::routes::testing::{app, call, test_state};
    use axum::http::Method;
    use waypoint_common::WaypointError;

    fn auth() -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "ws-test-secret".to_string(),
            ..AuthConfig::default()
        })
    }

    #[test]
    fn test_v2v_token_must_match_user() {
        let auth = auth();
        let tokens = auth.issue_tokens(7).unwrap();

        assert!(authorize_v2v(&auth, Some(&tokens.access_token), 7).is_ok());
        assert_eq!(
            authorize_v2v(&auth, Some(&tokens.access_token), 8),
            Err("Token does not match user")
        );
        assert_eq!(authorize_v2v(&auth, None, 7), Err("Missing token"));
        assert_eq!(
            authorize_v2v(&auth, Some(&tokens.refresh_token), 7),
            Err("Invalid token")
        );
        assert_eq!(authorize_v2v(&auth, Some("garbage"), 7), Err("Invalid token"));
    }

    #[test]
    fn test_voice_chat_frames() {
        assert_eq!(
            voice_chat_frame(Ok(VoiceChatReply::Silence)),
            Message::Text(String::new())
        );
        assert_eq!(
            voice_chat_frame(Ok(VoiceChatReply::Audio(vec![0xFF, 0xFB]))),
            Message::Binary(vec![0xFF, 0xFB])
        );
        assert_eq!(
            voice_chat_frame(Err(WaypointError::Upstream("Azure STT unavailable".to_string()))),
            Message::Text("ERROR: Azure STT unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn test_plain_get_is_not_upgraded() {
        let state = test_state().await;
        let app = app(&state).merge(routes().with_state(state));

        let (status, _) = call(&app, Method::GET, "/api/v1/voice/ws/voice-chat", None, None).await;
        assert!(status.is_client_error());
        assert_ne!(status, axum::http::StatusCode::NOT_FOUND);
    }
}
