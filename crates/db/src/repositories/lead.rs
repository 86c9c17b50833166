use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::lead::{Lead, LeadStatus, LeadUpdate};

use super::{parse_optional_timestamp, parse_timestamp, LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, name, company, phone, need, interest_confirmed, status,
                    crm_card_id, created_at, updated_at, last_contact_at
             FROM lead
             WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(lead_from_row).transpose()
    }

    async fn create(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        sqlx::query(
            "INSERT INTO lead (id, email, name, company, phone, need, interest_confirmed,
                               status, crm_card_id, created_at, updated_at, last_contact_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id)
        .bind(&lead.email)
        .bind(&lead.name)
        .bind(&lead.company)
        .bind(&lead.phone)
        .bind(&lead.need)
        .bind(lead.interest_confirmed)
        .bind(lead.status.as_str())
        .bind(&lead.crm_card_id)
        .bind(lead.created_at.to_rfc3339())
        .bind(lead.updated_at.to_rfc3339())
        .bind(lead.last_contact_at.map(|timestamp| timestamp.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(lead)
    }

    // Read-modify-write: single-row atomicity is all the store promises, and
    // last-write-wins on concurrent updates for the same email is accepted.
    async fn update(&self, email: &str, update: LeadUpdate) -> Result<Lead, RepositoryError> {
        let mut lead = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| RepositoryError::Missing(format!("lead with email `{email}`")))?;

        update.apply(&mut lead, Utc::now());

        sqlx::query(
            "UPDATE lead
             SET name = ?, company = ?, phone = ?, need = ?, interest_confirmed = ?,
                 status = ?, updated_at = ?, last_contact_at = ?
             WHERE email = ?",
        )
        .bind(&lead.name)
        .bind(&lead.company)
        .bind(&lead.phone)
        .bind(&lead.need)
        .bind(lead.interest_confirmed)
        .bind(lead.status.as_str())
        .bind(lead.updated_at.to_rfc3339())
        .bind(lead.last_contact_at.map(|timestamp| timestamp.to_rfc3339()))
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(lead)
    }

    async fn set_crm_card_id(&self, email: &str, card_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE lead SET crm_card_id = ?, updated_at = ? WHERE email = ?")
            .bind(card_id)
            .bind(Utc::now().to_rfc3339())
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = LeadStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lead status `{status_raw}`")))?;

    Ok(Lead {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        company: row.try_get("company")?,
        phone: row.try_get("phone")?,
        need: row.try_get("need")?,
        interest_confirmed: row.try_get("interest_confirmed")?,
        status,
        crm_card_id: row.try_get("crm_card_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        last_contact_at: parse_optional_timestamp(
            "last_contact_at",
            row.try_get("last_contact_at")?,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use leadline_core::domain::fields::ConversationData;
    use leadline_core::domain::lead::{Lead, LeadStatus, LeadUpdate};

    use crate::repositories::{LeadRepository, RepositoryError, SqlLeadRepository};
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlLeadRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlLeadRepository::new(pool)
    }

    fn lead_fixture(email: &str) -> Lead {
        let data = ConversationData::from_rows(
            "s-1",
            vec![
                ("name".to_string(), "Carla".to_string()),
                ("company".to_string(), "Empresa X".to_string()),
            ],
        );
        Lead::from_snapshot(
            uuid::Uuid::new_v4().to_string(),
            email.to_string(),
            &data,
            true,
            LeadStatus::Qualified,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_and_find_by_email_round_trip() {
        let repo = repo().await;
        let lead = repo.create(lead_fixture("carla@empresa.com")).await.expect("create");

        let found = repo.find_by_email("carla@empresa.com").await.expect("find").expect("present");
        assert_eq!(found.id, lead.id);
        assert_eq!(found.name.as_deref(), Some("Carla"));
        assert_eq!(found.status, LeadStatus::Qualified);
        assert!(found.interest_confirmed);

        assert!(repo.find_by_email("outra@empresa.com").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn update_applies_partial_changes_by_email() {
        let repo = repo().await;
        repo.create(lead_fixture("carla@empresa.com")).await.expect("create");

        let updated = repo
            .update(
                "carla@empresa.com",
                LeadUpdate::status_only(LeadStatus::MeetingScheduled, true),
            )
            .await
            .expect("update");

        assert_eq!(updated.status, LeadStatus::MeetingScheduled);
        assert_eq!(updated.name.as_deref(), Some("Carla"), "unset columns survive the update");
    }

    #[tokio::test]
    async fn update_of_unknown_email_reports_missing_row() {
        let repo = repo().await;
        let result =
            repo.update("ninguem@empresa.com", LeadUpdate::default()).await;
        assert!(matches!(result, Err(RepositoryError::Missing(_))));
    }

    #[tokio::test]
    async fn crm_card_id_is_stamped_by_email() {
        let repo = repo().await;
        repo.create(lead_fixture("carla@empresa.com")).await.expect("create");

        repo.set_crm_card_id("carla@empresa.com", "card-778").await.expect("stamp");

        let found = repo.find_by_email("carla@empresa.com").await.expect("find").expect("present");
        assert_eq!(found.crm_card_id.as_deref(), Some("card-778"));
    }
}
