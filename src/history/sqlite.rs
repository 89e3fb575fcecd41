use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::history::HistoryStore;
use crate::models::chat::ChatRecord;

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const INSERT_RECORD: &str =
    "INSERT INTO chat_history (user_id, message, is_user, timestamp) VALUES (?, ?, ?, ?)";

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn record(&self, user_id: i64, text: &str, is_user: bool) -> Result<i64, sqlx::Error> {
        let result = sqlx
            ::query(INSERT_RECORD)
            .bind(user_id)
            .bind(text)
            .bind(is_user)
            .bind(Utc::now())
            .execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    async fn record_exchange(
        &self,
        user_id: i64,
        question: &str,
        answer: &str
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        for (text, is_user) in [(question, true), (answer, false)] {
            sqlx
                ::query(INSERT_RECORD)
                .bind(user_id)
                .bind(text)
                .bind(is_user)
                .bind(now)
                .execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<ChatRecord>, sqlx::Error> {
        sqlx
            ::query_as::<_, ChatRecord>(
                r#"
            SELECT id, user_id, message, is_user, timestamp
            FROM chat_history
            WHERE user_id = ? AND is_user = 1
            ORDER BY id DESC
            LIMIT ?
            "#
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool).await
    }

    async fn answer_for(
        &self,
        user_id: i64,
        history_id: i64
    ) -> Result<Option<ChatRecord>, sqlx::Error> {
        sqlx
            ::query_as::<_, ChatRecord>(
                r#"
            SELECT a.id, a.user_id, a.message, a.is_user, a.timestamp
            FROM chat_history q
            JOIN chat_history a ON a.user_id = q.user_id AND a.id > q.id AND a.is_user = 0
            WHERE q.id = ? AND q.user_id = ? AND q.is_user = 1
            ORDER BY a.id ASC
            LIMIT 1
            "#
            )
            .bind(history_id)
            .bind(user_id)
            .fetch_optional(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store_with_users() -> SqliteHistoryStore {
        let pool = db::connect_in_memory().await.unwrap();
        for name in ["alice", "bob"] {
            sqlx::query("INSERT INTO user (username, password_hash) VALUES (?, 'x')")
                .bind(name)
                .execute(&pool).await
                .unwrap();
        }
        SqliteHistoryStore::new(pool)
    }

    #[tokio::test]
    async fn recorded_question_round_trips_through_recent() {
        let store = store_with_users().await;
        let id = store.record(1, "What is Rust?", true).await.unwrap();
        let recent = store.recent(1, 20).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, id);
        assert_eq!(recent[0].message, "What is Rust?");
        assert!(recent[0].is_user);
    }

    #[tokio::test]
    async fn recent_is_scoped_capped_and_newest_first() {
        let store = store_with_users().await;
        for i in 0..25 {
            store.record_exchange(1, &format!("q{}", i), &format!("a{}", i)).await.unwrap();
        }
        store.record_exchange(2, "bob question", "bob answer").await.unwrap();

        let recent = store.recent(1, 20).await.unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].message, "q24");
        assert!(recent.iter().all(|r| r.user_id == 1 && r.is_user));
        assert!(recent.windows(2).all(|w| w[0].id > w[1].id));

        let bob = store.recent(2, 20).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].message, "bob question");
    }

    #[tokio::test]
    async fn answer_for_returns_next_reply_of_same_user() {
        let store = store_with_users().await;
        let q1 = store.record(1, "first", true).await.unwrap();
        // Bob's reply lands between Alice's question and answer.
        store.record(2, "bob reply", false).await.unwrap();
        store.record(1, "first answer", false).await.unwrap();
        let q2 = store.record(1, "second", true).await.unwrap();

        let answer = store.answer_for(1, q1).await.unwrap().unwrap();
        assert_eq!(answer.message, "first answer");
        assert!(!answer.is_user);

        assert!(store.answer_for(1, q2).await.unwrap().is_none());
        assert!(store.answer_for(1, 9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn answer_for_hides_other_users_questions() {
        let store = store_with_users().await;
        let q = store.record(1, "private", true).await.unwrap();
        store.record(1, "private answer", false).await.unwrap();
        assert!(store.answer_for(2, q).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn answer_for_rejects_assistant_ids() {
        let store = store_with_users().await;
        store.record_exchange(1, "q1", "a1").await.unwrap();
        store.record_exchange(1, "q2", "a2").await.unwrap();
        let a1 = store
            .recent(1, 20).await
            .unwrap()
            .iter()
            .find(|r| r.message == "q1")
            .map(|r| r.id + 1)
            .unwrap();

        assert!(store.answer_for(1, a1).await.unwrap().is_none());
        assert_eq!(store.answer_for(1, a1 - 1).await.unwrap().unwrap().message, "a1");
    }
}
