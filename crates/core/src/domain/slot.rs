use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Candidate meeting window offered by the calendar provider. Transient: held
/// only in the slot cache, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl TimeSlot {
    pub fn new(starts_at: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self { starts_at, duration_minutes }
    }

    /// Numbered presentation line shown to the user, e.g.
    /// `1. segunda-feira, 10 de agosto de 2026 às 14:30`.
    pub fn format_option(&self, index: usize) -> String {
        format!("{}. {}", index + 1, format_datetime_pt_br(self.starts_at))
    }
}

/// Long-form Portuguese rendering of a datetime, matching the shape the
/// conversation presents: `segunda-feira, 10 de agosto de 2026 às 14:30`.
pub fn format_datetime_pt_br(datetime: DateTime<Utc>) -> String {
    format!(
        "{}, {} de {} de {} às {:02}:{:02}",
        weekday_pt_br(datetime.weekday()),
        datetime.day(),
        month_pt_br(datetime.month()),
        datetime.year(),
        datetime.hour(),
        datetime.minute()
    )
}

fn weekday_pt_br(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

fn month_pt_br(month: u32) -> &'static str {
    match month {
        1 => "janeiro",
        2 => "fevereiro",
        3 => "março",
        4 => "abril",
        5 => "maio",
        6 => "junho",
        7 => "julho",
        8 => "agosto",
        9 => "setembro",
        10 => "outubro",
        11 => "novembro",
        _ => "dezembro",
    }
}
