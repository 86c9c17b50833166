use chrono::Utc;
use sqlx::Row;

use leadline_core::domain::fields::ConversationData;

use super::{ConversationDataRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationDataRepository {
    pool: DbPool,
}

impl SqlConversationDataRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationDataRepository for SqlConversationDataRepository {
    async fn upsert_field(
        &self,
        session_id: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_data (session_id, field_name, field_value, collected_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (session_id, field_name)
             DO UPDATE SET field_value = excluded.field_value,
                           collected_at = excluded.collected_at",
        )
        .bind(session_id)
        .bind(field_name)
        .bind(field_value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn snapshot(&self, session_id: &str) -> Result<ConversationData, RepositoryError> {
        let rows = sqlx::query(
            "SELECT field_name, field_value
             FROM conversation_data
             WHERE session_id = ?
             ORDER BY collected_at ASC, field_name ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let pairs = rows
            .into_iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("field_name")?,
                    row.try_get::<String, _>("field_value")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(ConversationData::from_rows(session_id, pairs))
    }
}
