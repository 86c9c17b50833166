use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadline_core::domain::fields::ConversationData;
use leadline_core::domain::lead::{Lead, LeadUpdate};
use leadline_core::domain::meeting::{Meeting, MeetingStatus};
use leadline_core::domain::message::ChatMessage;
use leadline_core::domain::session::{Session, SessionStatus};
use leadline_core::errors::AppError;

pub mod conversation_data;
pub mod lead;
pub mod meeting;
pub mod memory;
pub mod message;
pub mod session;

pub use conversation_data::SqlConversationDataRepository;
pub use lead::SqlLeadRepository;
pub use meeting::SqlMeetingRepository;
pub use memory::{
    InMemoryConversationDataRepository, InMemoryLeadRepository, InMemoryMeetingRepository,
    InMemoryMessageRepository, InMemorySessionRepository,
};
pub use message::SqlMessageRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("row not found: {0}")]
    Missing(String),
}

impl From<RepositoryError> for AppError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Missing(what) => AppError::not_found(what),
            RepositoryError::Database(source) => AppError::internal(source.to_string()),
            RepositoryError::Decode(message) => AppError::internal(message),
        }
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), RepositoryError>;

    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError>;

    /// Slides the expiry window forward; `expires_at` is always `now +
    /// timeout` as computed by the caller.
    async fn extend(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), RepositoryError>;

    async fn update_email(&self, session_id: &str, email: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(
        &self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError>;

    /// Oldest-first history capped at `limit`, the window sent to the model.
    async fn list_recent(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, RepositoryError>;

    async fn create(&self, lead: Lead) -> Result<Lead, RepositoryError>;

    /// Applies a partial update to the lead keyed by `email` and returns the
    /// updated row; fails with [`RepositoryError::Missing`] when absent.
    async fn update(&self, email: &str, update: LeadUpdate) -> Result<Lead, RepositoryError>;

    async fn set_crm_card_id(&self, email: &str, card_id: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MeetingRepository: Send + Sync {
    async fn create(&self, meeting: Meeting) -> Result<(), RepositoryError>;

    async fn update_status(
        &self,
        meeting_id: &str,
        status: MeetingStatus,
    ) -> Result<(), RepositoryError>;

    async fn list_by_lead(&self, lead_id: &str) -> Result<Vec<Meeting>, RepositoryError>;
}

#[async_trait]
pub trait ConversationDataRepository: Send + Sync {
    /// Upsert with last-write-wins per (session, field).
    async fn upsert_field(
        &self,
        session_id: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<(), RepositoryError>;

    async fn snapshot(&self, session_id: &str) -> Result<ConversationData, RepositoryError>;
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| RepositoryError::Decode(format!("column `{column}` is not RFC3339: {error}")),
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|raw| parse_timestamp(column, raw)).transpose()
}
