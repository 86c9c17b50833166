//! In-memory repository doubles used by agent and server tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadline_core::domain::fields::ConversationData;
use leadline_core::domain::lead::{Lead, LeadUpdate};
use leadline_core::domain::meeting::{Meeting, MeetingStatus};
use leadline_core::domain::message::ChatMessage;
use leadline_core::domain::session::{Session, SessionStatus};

use super::{
    ConversationDataRepository, LeadRepository, MeetingRepository, MessageRepository,
    RepositoryError, SessionRepository,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn extend(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.expires_at = expires_at;
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = status;
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_email(&self, session_id: &str, email: &str) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.email = Some(email.to_string());
            session.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryMessageRepository {
    pub async fn count(&self, session_id: &str) -> usize {
        self.messages.read().await.get(session_id).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(
        &self,
        session_id: &str,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.entry(session_id.to_string()).or_default().push(message.clone());
        Ok(())
    }

    async fn list_recent(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut history = messages.get(session_id).cloned().unwrap_or_default();
        history.sort_by_key(|message| message.created_at);
        history.truncate(limit as usize);
        Ok(history)
    }
}

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<HashMap<String, Lead>>,
}

impl InMemoryLeadRepository {
    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.leads.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads.get(email).cloned())
    }

    async fn create(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        let mut leads = self.leads.write().await;
        if leads.contains_key(&lead.email) {
            return Err(RepositoryError::Decode(format!(
                "lead email `{}` violates unique index",
                lead.email
            )));
        }
        leads.insert(lead.email.clone(), lead.clone());
        Ok(lead)
    }

    async fn update(&self, email: &str, update: LeadUpdate) -> Result<Lead, RepositoryError> {
        let mut leads = self.leads.write().await;
        let lead = leads
            .get_mut(email)
            .ok_or_else(|| RepositoryError::Missing(format!("lead with email `{email}`")))?;
        update.apply(lead, Utc::now());
        Ok(lead.clone())
    }

    async fn set_crm_card_id(&self, email: &str, card_id: &str) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        if let Some(lead) = leads.get_mut(email) {
            lead.crm_card_id = Some(card_id.to_string());
            lead.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMeetingRepository {
    meetings: RwLock<Vec<Meeting>>,
}

impl InMemoryMeetingRepository {
    pub async fn len(&self) -> usize {
        self.meetings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.meetings.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MeetingRepository for InMemoryMeetingRepository {
    async fn create(&self, meeting: Meeting) -> Result<(), RepositoryError> {
        let mut meetings = self.meetings.write().await;
        meetings.push(meeting);
        Ok(())
    }

    async fn update_status(
        &self,
        meeting_id: &str,
        status: MeetingStatus,
    ) -> Result<(), RepositoryError> {
        let mut meetings = self.meetings.write().await;
        if let Some(meeting) = meetings.iter_mut().find(|meeting| meeting.id == meeting_id) {
            meeting.status = status;
            meeting.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_by_lead(&self, lead_id: &str) -> Result<Vec<Meeting>, RepositoryError> {
        let meetings = self.meetings.read().await;
        let mut matching = meetings
            .iter()
            .filter(|meeting| meeting.lead_id == lead_id)
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by_key(|meeting| std::cmp::Reverse(meeting.scheduled_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryConversationDataRepository {
    // Vec keeps insertion order so snapshots list fields in collection order.
    fields: RwLock<HashMap<String, Vec<(String, String)>>>,
}

#[async_trait::async_trait]
impl ConversationDataRepository for InMemoryConversationDataRepository {
    async fn upsert_field(
        &self,
        session_id: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<(), RepositoryError> {
        let mut fields = self.fields.write().await;
        let rows = fields.entry(session_id.to_string()).or_default();
        match rows.iter_mut().find(|(name, _)| name == field_name) {
            Some((_, value)) => *value = field_value.to_string(),
            None => rows.push((field_name.to_string(), field_value.to_string())),
        }
        Ok(())
    }

    async fn snapshot(&self, session_id: &str) -> Result<ConversationData, RepositoryError> {
        let fields = self.fields.read().await;
        let rows = fields.get(session_id).cloned().unwrap_or_default();
        Ok(ConversationData::from_rows(session_id, rows))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use leadline_core::domain::fields::ConversationData;
    use leadline_core::domain::lead::{Lead, LeadStatus, LeadUpdate};
    use leadline_core::domain::session::{Session, SessionStatus};

    use crate::repositories::{
        ConversationDataRepository, InMemoryConversationDataRepository, InMemoryLeadRepository,
        InMemorySessionRepository, LeadRepository, SessionRepository,
    };

    #[tokio::test]
    async fn session_double_tracks_status_and_expiry() {
        let repo = InMemorySessionRepository::default();
        let now = Utc::now();
        repo.create(Session::new("s-1".to_string(), now, Duration::minutes(30)))
            .await
            .expect("create");

        repo.extend("s-1", now + Duration::minutes(60)).await.expect("extend");
        repo.update_status("s-1", SessionStatus::Expired).await.expect("status");

        let session = repo.get("s-1").await.expect("present");
        assert_eq!(session.expires_at, now + Duration::minutes(60));
        assert_eq!(session.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn lead_double_enforces_unique_email() {
        let repo = InMemoryLeadRepository::default();
        let lead = Lead::from_snapshot(
            "l-1".to_string(),
            "gabi@empresa.com".to_string(),
            &ConversationData::new("s-1"),
            false,
            LeadStatus::Contacted,
            Utc::now(),
        );

        repo.create(lead.clone()).await.expect("first create");
        assert!(repo.create(lead).await.is_err(), "duplicate email must fail like the index");

        let updated = repo
            .update("gabi@empresa.com", LeadUpdate::status_only(LeadStatus::Qualified, true))
            .await
            .expect("update");
        assert_eq!(updated.status, LeadStatus::Qualified);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn field_double_is_last_write_wins() {
        let repo = InMemoryConversationDataRepository::default();

        repo.upsert_field("s-1", "phone", "11 91111-1111").await.expect("write");
        repo.upsert_field("s-1", "phone", "11 92222-2222").await.expect("write");

        let snapshot = repo.snapshot("s-1").await.expect("snapshot");
        assert_eq!(snapshot.phone.as_deref(), Some("11 92222-2222"));
        assert_eq!(snapshot.collected_fields, vec!["phone"]);
    }
}
