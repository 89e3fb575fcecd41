use chrono::{ DateTime, FixedOffset, Utc };
use serde::{ Serialize, Deserialize };
use sqlx::FromRow;

#[derive(Clone, Debug, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ChatRecord {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
}

/// A record prepared for display in the history pane.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub message: String,
    pub is_user: bool,
    pub timestamp: String,
}

impl ChatRecord {
    pub fn display(&self, offset: FixedOffset) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            message: self.message.clone(),
            is_user: self.is_user,
            timestamp: self.timestamp.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}
