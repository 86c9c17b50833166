use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::session::{Session, SessionStatus};

use super::{parse_timestamp, RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_session (session_id, email, status, created_at, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.session_id)
        .bind(&session.email)
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT session_id, email, status, created_at, updated_at, expires_at
             FROM chat_session
             WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row).transpose()
    }

    async fn extend(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE chat_session SET expires_at = ?, updated_at = ? WHERE session_id = ?")
            .bind(expires_at.to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE chat_session SET status = ?, updated_at = ? WHERE session_id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_email(&self, session_id: &str, email: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE chat_session SET email = ?, updated_at = ? WHERE session_id = ?")
            .bind(email)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn session_from_row(row: SqliteRow) -> Result<Session, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = SessionStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown session status `{status_raw}`")))?;

    Ok(Session {
        session_id: row.try_get("session_id")?,
        email: row.try_get("email")?,
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
    })
}
