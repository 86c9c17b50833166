use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::meeting::{Meeting, MeetingStatus};

use super::{parse_timestamp, MeetingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMeetingRepository {
    pool: DbPool,
}

impl SqlMeetingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MeetingRepository for SqlMeetingRepository {
    async fn create(&self, meeting: Meeting) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO meeting (id, lead_id, session_id, scheduled_at, meeting_link,
                                  calendar_event_id, status, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&meeting.id)
        .bind(&meeting.lead_id)
        .bind(&meeting.session_id)
        .bind(meeting.scheduled_at.to_rfc3339())
        .bind(&meeting.meeting_link)
        .bind(&meeting.calendar_event_id)
        .bind(meeting.status.as_str())
        .bind(&meeting.notes)
        .bind(meeting.created_at.to_rfc3339())
        .bind(meeting.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        meeting_id: &str,
        status: MeetingStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE meeting SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(meeting_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_by_lead(&self, lead_id: &str) -> Result<Vec<Meeting>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, lead_id, session_id, scheduled_at, meeting_link, calendar_event_id,
                    status, notes, created_at, updated_at
             FROM meeting
             WHERE lead_id = ?
             ORDER BY scheduled_at DESC",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(meeting_from_row).collect()
    }
}

fn meeting_from_row(row: SqliteRow) -> Result<Meeting, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = MeetingStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown meeting status `{status_raw}`")))?;

    Ok(Meeting {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        session_id: row.try_get("session_id")?,
        scheduled_at: parse_timestamp("scheduled_at", row.try_get("scheduled_at")?)?,
        meeting_link: row.try_get("meeting_link")?,
        calendar_event_id: row.try_get("calendar_event_id")?,
        status,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use leadline_core::domain::fields::ConversationData;
    use leadline_core::domain::lead::{Lead, LeadStatus};
    use leadline_core::domain::meeting::{Meeting, MeetingStatus};

    use crate::repositories::{
        LeadRepository, MeetingRepository, SqlLeadRepository, SqlMeetingRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool_with_lead(lead_id: &str) -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let mut lead = Lead::from_snapshot(
            lead_id.to_string(),
            "dora@empresa.com".to_string(),
            &ConversationData::new("s-1"),
            true,
            LeadStatus::MeetingScheduled,
            Utc::now(),
        );
        lead.name = Some("Dora".to_string());
        SqlLeadRepository::new(pool.clone()).create(lead).await.expect("lead");
        pool
    }

    fn meeting_fixture(id: &str, lead_id: &str, offset_hours: i64) -> Meeting {
        let now = Utc::now();
        Meeting {
            id: id.to_string(),
            lead_id: lead_id.to_string(),
            session_id: "s-1".to_string(),
            scheduled_at: now + Duration::hours(offset_hours),
            meeting_link: Some("https://cal.example/m/abc".to_string()),
            calendar_event_id: Some("evt-1".to_string()),
            status: MeetingStatus::Scheduled,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn meetings_list_newest_first_per_lead() {
        let pool = pool_with_lead("l-1").await;
        let repo = SqlMeetingRepository::new(pool);

        repo.create(meeting_fixture("m-1", "l-1", 24)).await.expect("create");
        repo.create(meeting_fixture("m-2", "l-1", 48)).await.expect("create");

        let meetings = repo.list_by_lead("l-1").await.expect("list");
        assert_eq!(meetings.len(), 2);
        assert_eq!(meetings[0].id, "m-2");
        assert!(repo.list_by_lead("l-9").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn status_update_persists() {
        let pool = pool_with_lead("l-1").await;
        let repo = SqlMeetingRepository::new(pool);
        repo.create(meeting_fixture("m-1", "l-1", 24)).await.expect("create");

        repo.update_status("m-1", MeetingStatus::Cancelled).await.expect("update");

        let meetings = repo.list_by_lead("l-1").await.expect("list");
        assert_eq!(meetings[0].status, MeetingStatus::Cancelled);
    }
}
