use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use leadline_core::config::CrmConfig;
use leadline_core::domain::lead::{Lead, LeadStatus};
use leadline_core::domain::meeting::Meeting;
use leadline_core::domain::slot::format_datetime_pt_br;
use leadline_core::errors::AppError;

const SYSTEM: &str = "Pipefy";

/// Card store the qualified/discarded leads sync to. The two `register_*`
/// composites are the entry points the dispatcher uses; they set the final
/// status, upsert the card, and leave a comment in one call.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn find_card_by_email(&self, email: &str) -> Result<Option<String>, AppError>;

    async fn create_card(
        &self,
        lead: &Lead,
        meeting: Option<&Meeting>,
    ) -> Result<String, AppError>;

    async fn update_card(
        &self,
        card_id: &str,
        lead: &Lead,
        meeting: Option<&Meeting>,
    ) -> Result<(), AppError>;

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), AppError>;

    async fn move_card(&self, card_id: &str, phase_id: &str) -> Result<(), AppError>;

    async fn upsert_card(
        &self,
        lead: &Lead,
        meeting: Option<&Meeting>,
    ) -> Result<String, AppError> {
        match self.find_card_by_email(&lead.email).await? {
            Some(card_id) => {
                self.update_card(&card_id, lead, meeting).await?;
                Ok(card_id)
            }
            None => self.create_card(lead, meeting).await,
        }
    }

    /// Lead declined: closed_lost card plus an explanatory comment. Comment
    /// failures are logged and swallowed; the card id still comes back.
    async fn register_no_interest_lead(&self, lead: &Lead) -> Result<String, AppError> {
        let mut lead = lead.clone();
        lead.status = LeadStatus::ClosedLost;
        lead.interest_confirmed = false;

        let card_id = self.upsert_card(&lead, None).await?;

        if let Err(error) = self
            .add_comment(
                &card_id,
                "Lead demonstrou não ter interesse no produto/serviço neste momento.",
            )
            .await
        {
            warn!(card_id = %card_id, error = %error, "crm comment failed after no-interest upsert");
        }

        Ok(card_id)
    }

    /// Meeting booked: meeting_scheduled card with the meeting fields and a
    /// confirmation comment carrying date and link.
    async fn register_qualified_lead(
        &self,
        lead: &Lead,
        meeting: &Meeting,
    ) -> Result<String, AppError> {
        let mut lead = lead.clone();
        lead.status = LeadStatus::MeetingScheduled;
        lead.interest_confirmed = true;

        let card_id = self.upsert_card(&lead, Some(meeting)).await?;

        let comment = format!(
            "✅ Lead qualificado!\n\nReunião agendada para: {}\nLink: {}",
            format_datetime_pt_br(meeting.scheduled_at),
            meeting.meeting_link.as_deref().unwrap_or("(sem link)")
        );
        if let Err(error) = self.add_comment(&card_id, &comment).await {
            warn!(card_id = %card_id, error = %error, "crm comment failed after qualified upsert");
        }

        Ok(card_id)
    }
}

const FIND_CARDS_QUERY: &str = "
query($pipeId: ID!, $search: String!) {
  cards(pipe_id: $pipeId, search: { term: $search }) {
    edges {
      node {
        id
        title
        fields {
          name
          value
        }
      }
    }
  }
}";

const CREATE_CARD_MUTATION: &str = "
mutation($pipeId: ID!, $phaseId: ID!, $fields: [FieldValueInput!]!) {
  createCard(input: {
    pipe_id: $pipeId
    phase_id: $phaseId
    fields_attributes: $fields
  }) {
    card {
      id
      title
    }
  }
}";

const UPDATE_CARD_MUTATION: &str = "
mutation($cardId: ID!, $fields: [FieldValueInput!]!) {
  updateCard(input: {
    id: $cardId
    fields_attributes: $fields
  }) {
    card {
      id
    }
  }
}";

const ADD_COMMENT_MUTATION: &str = "
mutation($cardId: ID!, $text: String!) {
  createComment(input: {
    card_id: $cardId
    text: $text
  }) {
    comment {
      id
    }
  }
}";

const MOVE_CARD_MUTATION: &str = "
mutation($cardId: ID!, $phaseId: ID!) {
  moveCardToPhase(input: {
    card_id: $cardId
    destination_phase_id: $phaseId
  }) {
    card {
      id
    }
  }
}";

pub struct PipefyClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    pipe_id: String,
    phase_id: String,
}

impl PipefyClient {
    pub fn new(config: &CrmConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            pipe_id: config.pipe_id.clone(),
            phase_id: config.phase_id.clone(),
        })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, AppError> {
        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::integration(
                SYSTEM,
                format!("request failed with status {}", response.status()),
            ));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        if let Some(message) = body
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return Err(AppError::integration(SYSTEM, message.to_string()));
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl CrmClient for PipefyClient {
    // Lookup failures degrade to "not found" so an unreachable CRM search
    // turns into a create attempt instead of failing the whole action.
    async fn find_card_by_email(&self, email: &str) -> Result<Option<String>, AppError> {
        let variables = json!({ "pipeId": self.pipe_id, "search": email });
        let data = match self.graphql(FIND_CARDS_QUERY, variables).await {
            Ok(data) => data,
            Err(error) => {
                warn!(error = %error, "crm card search failed, treating as no match");
                return Ok(None);
            }
        };

        Ok(match_card_by_email(&data, email))
    }

    async fn create_card(
        &self,
        lead: &Lead,
        meeting: Option<&Meeting>,
    ) -> Result<String, AppError> {
        let variables = json!({
            "pipeId": self.pipe_id,
            "phaseId": self.phase_id,
            "fields": build_fields_array(lead, meeting),
        });
        let data = self.graphql(CREATE_CARD_MUTATION, variables).await?;

        data.pointer("/createCard/card/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::integration(SYSTEM, "createCard response without card id"))
    }

    async fn update_card(
        &self,
        card_id: &str,
        lead: &Lead,
        meeting: Option<&Meeting>,
    ) -> Result<(), AppError> {
        let variables = json!({
            "cardId": card_id,
            "fields": build_fields_array(lead, meeting),
        });
        self.graphql(UPDATE_CARD_MUTATION, variables).await?;
        Ok(())
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), AppError> {
        let variables = json!({ "cardId": card_id, "text": text });
        self.graphql(ADD_COMMENT_MUTATION, variables).await?;
        Ok(())
    }

    async fn move_card(&self, card_id: &str, phase_id: &str) -> Result<(), AppError> {
        let variables = json!({ "cardId": card_id, "phaseId": phase_id });
        self.graphql(MOVE_CARD_MUTATION, variables).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct CardField {
    field_id: &'static str,
    field_value: String,
}

/// Field array for create/update mutations. Email and the status pair are
/// always present; the rest only when collected.
fn build_fields_array(lead: &Lead, meeting: Option<&Meeting>) -> Vec<CardField> {
    let mut fields = Vec::new();

    if let Some(name) = &lead.name {
        fields.push(CardField { field_id: "nome", field_value: name.clone() });
    }
    fields.push(CardField { field_id: "email", field_value: lead.email.clone() });
    if let Some(company) = &lead.company {
        fields.push(CardField { field_id: "empresa", field_value: company.clone() });
    }
    if let Some(phone) = &lead.phone {
        fields.push(CardField { field_id: "telefone", field_value: phone.clone() });
    }
    if let Some(need) = &lead.need {
        fields.push(CardField { field_id: "necessidade", field_value: need.clone() });
    }
    fields.push(CardField {
        field_id: "interesse_confirmado",
        field_value: lead.interest_confirmed.to_string(),
    });
    fields.push(CardField { field_id: "status", field_value: lead.status.as_str().to_string() });

    if let Some(meeting) = meeting {
        if let Some(link) = &meeting.meeting_link {
            fields.push(CardField { field_id: "meeting_link", field_value: link.clone() });
        }
        fields.push(CardField {
            field_id: "meeting_datetime",
            field_value: meeting.scheduled_at.to_rfc3339(),
        });
    }

    fields
}

/// Search results are fuzzy; only a card whose email-ish field matches
/// exactly counts.
fn match_card_by_email(data: &Value, email: &str) -> Option<String> {
    let edges = data.pointer("/cards/edges")?.as_array()?;

    for edge in edges {
        let Some(node) = edge.get("node") else { continue };
        let Some(fields) = node.get("fields").and_then(Value::as_array) else { continue };
        let matches = fields.iter().any(|field| {
            let name = field.get("name").and_then(Value::as_str).unwrap_or_default();
            let value = field.get("value").and_then(Value::as_str).unwrap_or_default();
            (name.to_lowercase().contains("email") || name == "E-mail") && value == email
        });
        if matches {
            return node.get("id").and_then(Value::as_str).map(str::to_string);
        }
    }

    None
}
