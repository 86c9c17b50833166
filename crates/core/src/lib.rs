//! Domain types, configuration, and the error taxonomy shared by every
//! leadline crate.
//!
//! The conversation core lives in `leadline-agent`; this crate holds what the
//! agent, store, and integrations all agree on: session/message/lead/meeting
//! entities, the closed collected-field mapping, transient time slots, and
//! the tagged [`AppError`] failure kinds.

pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::fields::{is_valid_email, ConversationData, LeadField, INTEREST_CONFIRMED};
pub use domain::lead::{Lead, LeadStatus, LeadUpdate};
pub use domain::meeting::{Meeting, MeetingStatus};
pub use domain::message::{ChatMessage, MessageRole};
pub use domain::session::{Session, SessionStatus};
pub use domain::slot::{format_datetime_pt_br, TimeSlot};
pub use errors::{AppError, ErrorKind};
