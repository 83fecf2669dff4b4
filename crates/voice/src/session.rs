use crate::prompts::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use waypoint_common::LocationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    Voice,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub ai_response: String,
    #[serde(rename = "type")]
    pub kind: TurnKind,
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub connection_id: u64,
    pub connected_at: DateTime<Utc>,
    pub conversation_history: Vec<ConversationTurn>,
    pub is_processing: bool,
    pub location_context: Option<LocationContext>,
    pub language: Language,
}

impl UserSession {
    fn new(connection_id: u64) -> Self {
        Self {
            connection_id,
            connected_at: Utc::now(),
            conversation_history: Vec::new(),
            is_processing: false,
            location_context: None,
            language: Language::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user_id: i64,
    pub connected_at: DateTime<Utc>,
    pub is_processing: bool,
    pub conversation_count: usize,
    pub language: Language,
}

/// What a turn needs from the session, copied out so no lock is held
/// across provider calls.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub language: Language,
    pub location: Option<LocationContext>,
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRejection {
    Busy,
    NoSession,
}

/// One session per user. Each connection gets a fresh id so a socket that
/// was replaced by a reconnect cannot touch the new session.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<i64, UserSession>>>,
    next_connection: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the user's session, replacing any previous one.
    pub async fn connect(&self, user_id: i64) -> u64 {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = self
            .sessions
            .write()
            .await
            .insert(user_id, UserSession::new(connection_id))
            .is_some();

        if replaced {
            info!("User {} reconnected; previous V2V session replaced", user_id);
        } else {
            info!("User {} connected to V2V service", user_id);
        }
        connection_id
    }

    pub async fn disconnect(&self, user_id: i64, connection_id: u64) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&user_id)
            .is_some_and(|s| s.connection_id == connection_id)
        {
            sessions.remove(&user_id);
            info!("User {} disconnected from V2V service", user_id);
        }
    }

    pub async fn try_begin_turn(
        &self,
        user_id: i64,
        connection_id: u64,
    ) -> Result<(), TurnRejection> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&user_id)
            .filter(|s| s.connection_id == connection_id)
            .ok_or(TurnRejection::NoSession)?;

        if session.is_processing {
            return Err(TurnRejection::Busy);
        }
        session.is_processing = true;
        Ok(())
    }

    pub async fn end_turn(&self, user_id: i64, connection_id: u64) {
        if let Some(session) = self.sessions.write().await.get_mut(&user_id) {
            if session.connection_id == connection_id {
                session.is_processing = false;
            }
        }
    }

    /// Updates only the session opened by `connection_id`.
    pub async fn set_language(&self, user_id: i64, connection_id: u64, language: Language) {
        if let Some(session) = self.sessions.write().await.get_mut(&user_id) {
            if session.connection_id == connection_id {
                session.language = language;
            }
        }
    }

    pub async fn language(&self, user_id: i64) -> Language {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .map(|s| s.language)
            .unwrap_or_default()
    }

    pub async fn set_location(&self, user_id: i64, connection_id: u64, location: LocationContext) {
        if let Some(session) = self.sessions.write().await.get_mut(&user_id) {
            if session.connection_id == connection_id {
                debug!("Location context for user {}: {}", user_id, location.city.name);
                session.location_context = Some(location);
            }
        }
    }

    pub async fn turn_context(&self, user_id: i64, connection_id: u64) -> Option<TurnContext> {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .filter(|s| s.connection_id == connection_id)
            .map(|s| TurnContext {
                language: s.language,
                location: s.location_context.clone(),
                history: s.conversation_history.clone(),
            })
    }

    /// Returns false when the session went away while the turn ran.
    pub async fn record_turn(&self, user_id: i64, connection_id: u64, turn: ConversationTurn) -> bool {
        match self.sessions.write().await.get_mut(&user_id) {
            Some(session) if session.connection_id == connection_id => {
                session.conversation_history.push(turn);
                true
            }
            _ => false,
        }
    }

    pub async fn history(&self, user_id: i64) -> Vec<ConversationTurn> {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .map(|s| s.conversation_history.clone())
            .unwrap_or_default()
    }

    pub async fn clear_history(&self, user_id: i64) -> bool {
        match self.sessions.write().await.get_mut(&user_id) {
            Some(session) => {
                session.conversation_history.clear();
                true
            }
            None => false,
        }
    }

    pub async fn info(&self, user_id: i64) -> Option<SessionInfo> {
        self.sessions.read().await.get(&user_id).map(|s| SessionInfo {
            user_id,
            connected_at: s.connected_at,
            is_processing: s.is_processing,
            conversation_count: s.conversation_history.len(),
            language: s.language,
        })
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn total_conversations(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.conversation_history.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn {
            timestamp: Utc::now(),
            user_input: text.to_string(),
            ai_response: "ok".to_string(),
            kind: TurnKind::Text,
        }
    }

    #[tokio::test]
    async fn test_busy_flag() {
        let manager = SessionManager::new();
        let conn = manager.connect(1).await;

        assert_eq!(manager.try_begin_turn(1, conn).await, Ok(()));
        assert_eq!(manager.try_begin_turn(1, conn).await, Err(TurnRejection::Busy));
        manager.end_turn(1, conn).await;
        assert_eq!(manager.try_begin_turn(1, conn).await, Ok(()));

        assert_eq!(manager.try_begin_turn(2, conn).await, Err(TurnRejection::NoSession));
    }

    #[tokio::test]
    async fn test_concurrent_begin_admits_one() {
        let manager = SessionManager::new();
        let conn = manager.connect(7).await;

        let attempts = (0..16).map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.try_begin_turn(7, conn).await })
        });
        let mut admitted = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let manager = SessionManager::new();
        let old = manager.connect(1).await;
        assert!(manager.record_turn(1, old, turn("first")).await);
        manager.set_language(1, old, Language::English).await;

        let new = manager.connect(1).await;
        assert_ne!(old, new);
        assert!(manager.history(1).await.is_empty());
        assert_eq!(manager.language(1).await, Language::Kazakh);

        // the stale socket can neither write nor tear down the new session
        assert!(!manager.record_turn(1, old, turn("stale")).await);
        manager.set_language(1, old, Language::English).await;
        assert_eq!(manager.language(1).await, Language::Kazakh);
        assert!(manager.turn_context(1, old).await.is_none());
        assert!(manager.turn_context(1, new).await.is_some());
        manager.disconnect(1, old).await;
        assert_eq!(manager.active_sessions().await, 1);

        manager.disconnect(1, new).await;
        assert_eq!(manager.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_history_and_stats() {
        let manager = SessionManager::new();
        let a = manager.connect(1).await;
        let b = manager.connect(2).await;
        manager.record_turn(1, a, turn("one")).await;
        manager.record_turn(1, a, turn("two")).await;
        manager.record_turn(2, b, turn("three")).await;

        assert_eq!(manager.total_conversations().await, 3);
        let info = manager.info(1).await.unwrap();
        assert_eq!(info.conversation_count, 2);
        assert!(!info.is_processing);

        assert!(manager.clear_history(1).await);
        assert!(manager.history(1).await.is_empty());
        assert!(!manager.clear_history(99).await);
        assert!(manager.info(99).await.is_none());
    }

    #[test]
    fn test_turn_serializes_type() {
        let json = serde_json::to_value(turn("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["user_input"], "hi");
    }
}
