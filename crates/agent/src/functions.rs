//! Maps model-requested function calls to domain actions. Nothing here ever
//! fails the turn: every error, expected or not, folds into a
//! [`FunctionOutcome`] the model can react to conversationally.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use leadline_core::domain::fields::{is_valid_email, LeadField, INTEREST_CONFIRMED};
use leadline_core::domain::lead::{Lead, LeadStatus, LeadUpdate};
use leadline_core::domain::meeting::{Meeting, MeetingStatus};
use leadline_core::domain::session::SessionStatus;
use leadline_core::domain::slot::format_datetime_pt_br;
use leadline_core::errors::AppError;
use leadline_db::repositories::{
    ConversationDataRepository, LeadRepository, MeetingRepository, SessionRepository,
};
use leadline_integrations::{Attendee, CalendarClient, CrmClient};

use crate::llm::FunctionOutcome;
use crate::slots::SlotCache;

const DEFAULT_DAYS_AHEAD: u32 = 7;
const OFFERED_SLOTS: usize = 3;

pub struct FunctionDispatcher {
    sessions: Arc<dyn SessionRepository>,
    data: Arc<dyn ConversationDataRepository>,
    leads: Arc<dyn LeadRepository>,
    meetings: Arc<dyn MeetingRepository>,
    slot_cache: Arc<SlotCache>,
    calendar: Arc<dyn CalendarClient>,
    crm: Arc<dyn CrmClient>,
}

impl FunctionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        data: Arc<dyn ConversationDataRepository>,
        leads: Arc<dyn LeadRepository>,
        meetings: Arc<dyn MeetingRepository>,
        slot_cache: Arc<SlotCache>,
        calendar: Arc<dyn CalendarClient>,
        crm: Arc<dyn CrmClient>,
    ) -> Self {
        Self { sessions, data, leads, meetings, slot_cache, calendar, crm }
    }

    pub async fn execute(
        &self,
        function_name: &str,
        args: &Value,
        session_id: &str,
    ) -> FunctionOutcome {
        info!(function = function_name, session_id, "executando função do agente");

        let result = match function_name {
            "coletar_informacao" => self.collect_information(session_id, args).await,
            "confirmar_interesse" => self.confirm_interest(session_id, args).await,
            "buscar_horarios_disponiveis" => self.fetch_available_slots(session_id, args).await,
            "agendar_reuniao" => self.book_meeting(session_id, args).await,
            other => return FunctionOutcome::fail(format!("Função desconhecida: {other}")),
        };

        result.unwrap_or_else(|app_error| {
            error!(
                function = function_name,
                session_id,
                error = %app_error,
                "função do agente falhou"
            );
            FunctionOutcome::fail(app_error.to_string())
        })
    }

    async fn collect_information(
        &self,
        session_id: &str,
        args: &Value,
    ) -> Result<FunctionOutcome, AppError> {
        let Some(label) = string_arg(args, "campo") else {
            return Ok(FunctionOutcome::fail("Argumento obrigatório ausente: campo"));
        };
        let Some(value) = string_arg(args, "valor") else {
            return Ok(FunctionOutcome::fail("Argumento obrigatório ausente: valor"));
        };

        let Some(field) = LeadField::from_label(label) else {
            return Ok(FunctionOutcome::fail(format!("Campo desconhecido: {label}")));
        };

        if field == LeadField::Email && !is_valid_email(value) {
            return Ok(FunctionOutcome::fail(
                "Email inválido. Por favor, forneça um email válido.",
            ));
        }

        self.data.upsert_field(session_id, field.column(), value).await?;

        if field == LeadField::Email {
            self.sessions.update_email(session_id, value).await?;
        }

        Ok(FunctionOutcome::ok(json!({
            "campo": label,
            "valor": value,
            "mensagem": format!("{label} salvo com sucesso."),
        })))
    }

    async fn confirm_interest(
        &self,
        session_id: &str,
        args: &Value,
    ) -> Result<FunctionOutcome, AppError> {
        let Some(confirmation) = string_arg(args, "confirmado") else {
            return Ok(FunctionOutcome::fail("Argumento obrigatório ausente: confirmado"));
        };
        let confirmed = confirmation.trim().eq_ignore_ascii_case("sim");

        // The flag is recorded even when the lead upsert below is gated off.
        self.data
            .upsert_field(session_id, INTEREST_CONFIRMED, if confirmed { "true" } else { "false" })
            .await?;

        let snapshot = self.data.snapshot(session_id).await?;
        let Some(email) = snapshot.email.clone() else {
            return Ok(FunctionOutcome::fail("Email não foi coletado ainda."));
        };

        let status = if confirmed { LeadStatus::Qualified } else { LeadStatus::Contacted };
        let lead = match self.leads.find_by_email(&email).await? {
            Some(_) => {
                self.leads
                    .update(&email, LeadUpdate::from_snapshot(&snapshot, confirmed, status))
                    .await?
            }
            None => {
                self.leads
                    .create(Lead::from_snapshot(
                        Uuid::new_v4().to_string(),
                        email.clone(),
                        &snapshot,
                        confirmed,
                        status,
                        Utc::now(),
                    ))
                    .await?
            }
        };

        if !confirmed {
            let card_id = self.crm.register_no_interest_lead(&lead).await?;
            self.leads.set_crm_card_id(&email, &card_id).await?;
        }

        Ok(FunctionOutcome::ok(json!({
            "interesseConfirmado": confirmed,
            "mensagem": if confirmed {
                "Interesse confirmado! Vamos agendar uma reunião."
            } else {
                "Entendido. Agradecemos seu tempo."
            },
        })))
    }

    async fn fetch_available_slots(
        &self,
        session_id: &str,
        args: &Value,
    ) -> Result<FunctionOutcome, AppError> {
        let days_ahead = match args.get("dias_adiante") {
            Some(Value::String(raw)) => raw.trim().parse().unwrap_or(DEFAULT_DAYS_AHEAD),
            Some(Value::Number(number)) => {
                number.as_u64().map_or(DEFAULT_DAYS_AHEAD, |days| days as u32)
            }
            _ => DEFAULT_DAYS_AHEAD,
        };

        let slots = self.calendar.list_slots(days_ahead).await?;
        if slots.is_empty() {
            return Ok(FunctionOutcome::fail("Não há horários disponíveis no momento."));
        }

        let formatted = slots
            .iter()
            .take(OFFERED_SLOTS)
            .enumerate()
            .map(|(index, slot)| slot.format_option(index))
            .collect::<Vec<_>>();
        let total = slots.len();

        // The full list is cached; only the first few are offered in text,
        // but the model may book any cached index.
        self.slot_cache.put(session_id, slots).await;

        Ok(FunctionOutcome::ok(json!({
            "slots": formatted,
            "total": total,
            "mensagem": "Aqui estão os horários disponíveis:",
        })))
    }

    async fn book_meeting(
        &self,
        session_id: &str,
        args: &Value,
    ) -> Result<FunctionOutcome, AppError> {
        let index = match args.get("indice_horario") {
            Some(Value::String(raw)) => raw.trim().parse::<usize>().ok(),
            Some(Value::Number(number)) => number.as_u64().map(|index| index as usize),
            _ => None,
        };

        let Some(slots) = self.slot_cache.get(session_id).await.filter(|slots| !slots.is_empty())
        else {
            return Ok(FunctionOutcome::fail(
                "Horários não encontrados. Por favor, busque os horários novamente.",
            ));
        };

        let Some(slot) = index.and_then(|index| slots.get(index).copied()) else {
            return Ok(FunctionOutcome::fail("Índice de horário inválido."));
        };

        let snapshot = self.data.snapshot(session_id).await?;
        let (Some(email), Some(name)) = (snapshot.email.clone(), snapshot.name.clone()) else {
            return Ok(FunctionOutcome::fail(
                "Nome e email são obrigatórios para agendar uma reunião.",
            ));
        };

        let attendee = Attendee { name, email: email.clone(), company: snapshot.company.clone() };
        let booking = self.calendar.book(&slot, &attendee).await?;

        let lead = match self.leads.find_by_email(&email).await? {
            Some(_) => {
                self.leads
                    .update(&email, LeadUpdate::status_only(LeadStatus::MeetingScheduled, true))
                    .await?
            }
            None => {
                self.leads
                    .create(Lead::from_snapshot(
                        Uuid::new_v4().to_string(),
                        email.clone(),
                        &snapshot,
                        true,
                        LeadStatus::MeetingScheduled,
                        Utc::now(),
                    ))
                    .await?
            }
        };

        let now = Utc::now();
        let meeting = Meeting {
            id: Uuid::new_v4().to_string(),
            lead_id: lead.id.clone(),
            session_id: session_id.to_string(),
            scheduled_at: slot.starts_at,
            meeting_link: Some(booking.meeting_link.clone()),
            calendar_event_id: Some(booking.event_id.clone()),
            status: MeetingStatus::Scheduled,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        self.meetings.create(meeting.clone()).await?;

        let card_id = self.crm.register_qualified_lead(&lead, &meeting).await?;
        self.leads.set_crm_card_id(&email, &card_id).await?;

        self.slot_cache.remove(session_id).await;
        self.sessions.update_status(session_id, SessionStatus::Completed).await?;

        let formatted_date = format_datetime_pt_br(slot.starts_at);
        Ok(FunctionOutcome::ok(json!({
            "meetingLink": booking.meeting_link,
            "meetingDatetime": slot.starts_at.to_rfc3339(),
            "formattedDate": formatted_date,
            "mensagem": format!("Reunião agendada com sucesso para {formatted_date}!"),
        })))
    }
}

fn string_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|value| !value.trim().is_empty())
}
