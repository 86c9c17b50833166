use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use leadline_core::config::CalendarConfig;
use leadline_core::domain::slot::TimeSlot;
use leadline_core::errors::AppError;

const SYSTEM: &str = "Calendar";
/// The provider returns availability for the whole window; only the nearest
/// few are worth offering in conversation.
const MAX_SLOTS: usize = 5;
const DEFAULT_DURATION_MINUTES: u32 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attendee {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Booking {
    pub event_id: String,
    pub meeting_link: String,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn list_slots(&self, days_ahead: u32) -> Result<Vec<TimeSlot>, AppError>;

    async fn book(&self, slot: &TimeSlot, attendee: &Attendee) -> Result<Booking, AppError>;

    async fn cancel(&self, event_id: &str) -> Result<bool, AppError>;
}

/// Cal.com v1 API client. Slots come back grouped per day; bookings carry the
/// attendee plus the company as a free-text note.
pub struct CalcomClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    event_type_id: String,
    timezone: String,
}

impl CalcomClient {
    pub fn new(config: &CalendarConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            event_type_id: config.event_type_id.clone(),
            timezone: config.timezone.clone(),
        })
    }
}

#[async_trait]
impl CalendarClient for CalcomClient {
    async fn list_slots(&self, days_ahead: u32) -> Result<Vec<TimeSlot>, AppError> {
        let start = Utc::now();
        let end = start + chrono::Duration::days(i64::from(days_ahead));

        let response = self
            .http
            .get(format!("{}/slots", self.base_url))
            .query(&[
                ("apiKey", self.api_key.expose_secret()),
                ("eventTypeId", self.event_type_id.as_str()),
                ("startTime", start.to_rfc3339().as_str()),
                ("endTime", end.to_rfc3339().as_str()),
                ("timeZone", self.timezone.as_str()),
            ])
            .send()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::integration(
                SYSTEM,
                format!("slot lookup failed with status {}", response.status()),
            ));
        }

        let body = response
            .json::<SlotsResponse>()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        Ok(collect_slots(body))
    }

    async fn book(&self, slot: &TimeSlot, attendee: &Attendee) -> Result<Booking, AppError> {
        let notes = attendee
            .company
            .as_ref()
            .map(|company| format!("Empresa: {company}"))
            .unwrap_or_default();

        let request = BookingRequest {
            event_type_id: self.event_type_id.clone(),
            start: slot.starts_at.to_rfc3339(),
            responses: BookingResponses {
                name: attendee.name.clone(),
                email: attendee.email.clone(),
                notes,
            },
            time_zone: self.timezone.clone(),
            language: "pt-BR".to_string(),
            metadata: BookingMetadata { source: "leadline".to_string() },
        };

        let response = self
            .http
            .post(format!("{}/bookings", self.base_url))
            .query(&[("apiKey", self.api_key.expose_secret())])
            .json(&request)
            .send()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::integration(
                SYSTEM,
                format!("booking failed with status {}", response.status()),
            ));
        }

        let body = response
            .json::<BookingResponse>()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        booking_from_response(body)
    }

    async fn cancel(&self, event_id: &str) -> Result<bool, AppError> {
        let response = self
            .http
            .delete(format!("{}/bookings/{event_id}", self.base_url))
            .query(&[("apiKey", self.api_key.expose_secret())])
            .send()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::integration(
                SYSTEM,
                format!("cancellation failed with status {}", response.status()),
            ));
        }

        Ok(true)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SlotsResponse {
    #[serde(default)]
    slots: HashMap<String, Vec<SlotEntry>>,
}

#[derive(Debug, Deserialize)]
struct SlotEntry {
    time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingRequest {
    event_type_id: String,
    start: String,
    responses: BookingResponses,
    time_zone: String,
    language: String,
    metadata: BookingMetadata,
}

#[derive(Debug, Serialize)]
struct BookingResponses {
    name: String,
    email: String,
    notes: String,
}

#[derive(Debug, Serialize)]
struct BookingMetadata {
    source: String,
}

#[derive(Debug, Deserialize)]
struct BookingResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default, rename = "meetingUrl")]
    meeting_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Flattens the per-day grouping, sorts ascending, and keeps the nearest
/// `MAX_SLOTS`. Map iteration order is unspecified, so sorting is what makes
/// "nearest" deterministic.
fn collect_slots(response: SlotsResponse) -> Vec<TimeSlot> {
    let mut slots = response
        .slots
        .into_values()
        .flatten()
        .map(|entry| TimeSlot::new(entry.time, DEFAULT_DURATION_MINUTES))
        .collect::<Vec<_>>();

    slots.sort_by_key(|slot| slot.starts_at);
    slots.truncate(MAX_SLOTS);
    slots
}

fn booking_from_response(body: BookingResponse) -> Result<Booking, AppError> {
    let event_id = body
        .id
        .clone()
        .map(|value| match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .or(body.uid.clone())
        .ok_or_else(|| AppError::integration(SYSTEM, "booking response without id"))?;

    let meeting_link = body
        .meeting_link_or_url()
        .ok_or_else(|| AppError::integration(SYSTEM, "booking response without meeting link"))?;

    Ok(Booking { event_id, meeting_link })
}

impl BookingResponse {
    fn meeting_link_or_url(&self) -> Option<String> {
        self.meeting_url.clone().or_else(|| self.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{booking_from_response, collect_slots, BookingResponse, SlotsResponse};

    #[test]
    fn slots_flatten_sorted_and_capped_at_five() {
        let body: SlotsResponse = serde_json::from_value(json!({
            "slots": {
                "2026-08-11": [
                    {"time": "2026-08-11T15:00:00Z"},
                    {"time": "2026-08-11T14:00:00Z"}
                ],
                "2026-08-10": [
                    {"time": "2026-08-10T13:00:00Z"},
                    {"time": "2026-08-10T14:00:00Z"},
                    {"time": "2026-08-10T15:00:00Z"},
                    {"time": "2026-08-10T16:00:00Z"}
                ]
            }
        }))
        .expect("deserialize");

        let slots = collect_slots(body);
        assert_eq!(slots.len(), 5);
        assert_eq!(slots[0].starts_at.to_rfc3339(), "2026-08-10T13:00:00+00:00");
        assert_eq!(slots[4].starts_at.to_rfc3339(), "2026-08-11T14:00:00+00:00");
        assert!(slots.windows(2).all(|pair| pair[0].starts_at <= pair[1].starts_at));
    }

    #[test]
    fn empty_slot_payload_yields_no_slots() {
        let body: SlotsResponse = serde_json::from_value(json!({})).expect("deserialize");
        assert!(collect_slots(body).is_empty());
    }

    #[test]
    fn booking_accepts_numeric_id_and_url_fallback() {
        let body: BookingResponse = serde_json::from_value(json!({
            "id": 98431,
            "url": "https://cal.example/booking/98431"
        }))
        .expect("deserialize");

        let booking = booking_from_response(body).expect("booking");
        assert_eq!(booking.event_id, "98431");
        assert_eq!(booking.meeting_link, "https://cal.example/booking/98431");
    }

    #[test]
    fn booking_prefers_uid_when_id_is_absent() {
        let body: BookingResponse = serde_json::from_value(json!({
            "uid": "abc-123",
            "meetingUrl": "https://meet.example/abc-123"
        }))
        .expect("deserialize");

        let booking = booking_from_response(body).expect("booking");
        assert_eq!(booking.event_id, "abc-123");
        assert_eq!(booking.meeting_link, "https://meet.example/abc-123");
    }

    #[test]
    fn booking_without_identifiers_is_an_integration_error() {
        let body: BookingResponse = serde_json::from_value(serde_json::json!({})).expect("de");
        assert!(booking_from_response(body).is_err());
    }
}
