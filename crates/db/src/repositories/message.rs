use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::message::{ChatMessage, MessageRole};

use super::{parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(
        &self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_message (session_id, role, content, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at
             FROM chat_message
             WHERE session_id = ?
             ORDER BY created_at ASC, id ASC
             LIMIT ?",
        )
        .bind(session_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = MessageRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_raw}`")))?;

    Ok(ChatMessage {
        role,
        content: row.try_get("content")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use leadline_core::domain::message::{ChatMessage, MessageRole};
    use leadline_core::domain::session::Session;

    use crate::repositories::{
        MessageRepository, SessionRepository, SqlMessageRepository, SqlSessionRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool_with_session(session_id: &str) -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlSessionRepository::new(pool.clone())
            .create(Session::new(session_id.to_string(), Utc::now(), Duration::minutes(30)))
            .await
            .expect("session");
        pool
    }

    #[tokio::test]
    async fn history_comes_back_oldest_first_and_capped() {
        let pool = pool_with_session("s-1").await;
        let repo = SqlMessageRepository::new(pool);
        let base = Utc::now();

        for (offset, content) in ["primeira", "segunda", "terceira"].iter().enumerate() {
            let message = ChatMessage::new(
                MessageRole::User,
                *content,
                base + Duration::seconds(offset as i64),
            );
            repo.append("s-1", &message).await.expect("append");
        }

        let all = repo.list_recent("s-1", 50).await.expect("list");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].content, "primeira");
        assert_eq!(all[2].content, "terceira");

        let capped = repo.list_recent("s-1", 2).await.expect("list capped");
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].content, "primeira");
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_session() {
        let pool = pool_with_session("s-1").await;
        let repo = SqlMessageRepository::new(pool);

        let message = ChatMessage::new(MessageRole::Assistant, "olá", Utc::now());
        repo.append("s-1", &message).await.expect("append");

        assert!(repo.list_recent("s-2", 50).await.expect("list").is_empty());
    }
}
