mod sqlite;

use async_trait::async_trait;
use log::info;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::chat::ChatRecord;

pub use sqlite::SqliteHistoryStore;

/// Append-only store of chat turns. Ids increase monotonically, which is what
/// pairs a question with its answer.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, user_id: i64, text: &str, is_user: bool) -> Result<i64, sqlx::Error>;

    /// Writes a question and its answer together, or neither.
    async fn record_exchange(
        &self,
        user_id: i64,
        question: &str,
        answer: &str
    ) -> Result<(), sqlx::Error>;

    /// Most recent user-authored turns, newest first.
    async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<ChatRecord>, sqlx::Error>;

    /// First assistant turn after `history_id` for the owner of that question.
    async fn answer_for(
        &self,
        user_id: i64,
        history_id: i64
    ) -> Result<Option<ChatRecord>, sqlx::Error>;
}

pub fn initialize_history_store(pool: SqlitePool) -> Arc<dyn HistoryStore> {
    info!("Chat history will be stored in SQLite");
    Arc::new(SqliteHistoryStore::new(pool))
}
