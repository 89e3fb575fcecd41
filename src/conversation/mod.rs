use log::debug;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    New,
    Continue,
}

impl SessionMode {
    /// Only the literal `new` starts over; anything else, or nothing, continues.
    pub fn from_form(value: Option<&str>) -> Self {
        match value {
            Some("new") => SessionMode::New,
            _ => SessionMode::Continue,
        }
    }
}

/// Last upstream response id per user, used to chain follow-up turns.
#[derive(Debug, Default)]
pub struct ConversationTracker {
    tokens: RwLock<HashMap<UserId, String>>,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reset(&self, user: UserId) {
        if self.tokens.write().await.remove(&user).is_some() {
            debug!("Conversation reset for user {}", user);
        }
    }

    pub async fn get(&self, user: UserId) -> Option<String> {
        self.tokens.read().await.get(&user).cloned()
    }

    pub async fn set(&self, user: UserId, token: impl Into<String>) {
        let token = token.into();
        if token.is_empty() {
            self.reset(user).await;
            return;
        }
        self.tokens.write().await.insert(user, token);
    }

    /// Prepares a turn: clears the token for a new conversation, otherwise
    /// returns the one to chain onto.
    pub async fn begin(&self, user: UserId, mode: SessionMode) -> Option<String> {
        match mode {
            SessionMode::New => {
                self.reset(user).await;
                None
            }
            SessionMode::Continue => self.get(user).await,
        }
    }
}
