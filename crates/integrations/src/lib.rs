//! Outbound integrations: the scheduling provider (Cal.com-style REST) and
//! the CRM (Pipefy-style GraphQL). Each sits behind a narrow trait so the
//! dispatcher can be exercised with test doubles; every failure normalizes to
//! [`leadline_core::AppError::Integration`] carrying the source system name.

pub mod calendar;
pub mod crm;

pub use calendar::{Attendee, Booking, CalcomClient, CalendarClient};
pub use crm::{CrmClient, PipefyClient};
