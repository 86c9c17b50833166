use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::fields::ConversationData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    MeetingScheduled,
    ClosedWon,
    ClosedLost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::MeetingScheduled => "meeting_scheduled",
            Self::ClosedWon => "closed_won",
            Self::ClosedLost => "closed_lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "qualified" => Some(Self::Qualified),
            "meeting_scheduled" => Some(Self::MeetingScheduled),
            "closed_won" => Some(Self::ClosedWon),
            "closed_lost" => Some(Self::ClosedLost),
            _ => None,
        }
    }
}

/// CRM-facing prospect record. Keyed by email, which never changes once the
/// lead exists; a returning email across sessions updates the same row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub need: Option<String>,
    pub interest_confirmed: bool,
    pub status: LeadStatus,
    pub crm_card_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_contact_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Builds a lead from the session's collected field snapshot. Caller must
    /// have checked that an email was collected.
    pub fn from_snapshot(
        id: String,
        email: String,
        data: &ConversationData,
        interest_confirmed: bool,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            name: data.name.clone(),
            company: data.company.clone(),
            phone: data.phone.clone(),
            need: data.need.clone(),
            interest_confirmed,
            status,
            crm_card_id: None,
            created_at: now,
            updated_at: now,
            last_contact_at: Some(now),
        }
    }
}

/// Partial update applied to an existing lead; `None` leaves the column as-is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeadUpdate {
    pub name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub need: Option<String>,
    pub interest_confirmed: Option<bool>,
    pub status: Option<LeadStatus>,
}

impl LeadUpdate {
    pub fn from_snapshot(
        data: &ConversationData,
        interest_confirmed: bool,
        status: LeadStatus,
    ) -> Self {
        Self {
            name: data.name.clone(),
            company: data.company.clone(),
            phone: data.phone.clone(),
            need: data.need.clone(),
            interest_confirmed: Some(interest_confirmed),
            status: Some(status),
        }
    }

    pub fn status_only(status: LeadStatus, interest_confirmed: bool) -> Self {
        Self {
            interest_confirmed: Some(interest_confirmed),
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, lead: &mut Lead, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            lead.name = Some(name.clone());
        }
        if let Some(company) = &self.company {
            lead.company = Some(company.clone());
        }
        if let Some(phone) = &self.phone {
            lead.phone = Some(phone.clone());
        }
        if let Some(need) = &self.need {
            lead.need = Some(need.clone());
        }
        if let Some(interest_confirmed) = self.interest_confirmed {
            lead.interest_confirmed = interest_confirmed;
        }
        if let Some(status) = self.status {
            lead.status = status;
        }
        lead.updated_at = now;
        lead.last_contact_at = Some(now);
    }
}
