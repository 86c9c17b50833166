//! Collected-field mapping for the qualification conversation.
//!
//! The model reports field labels in Portuguese (the language it converses
//! in); storage uses canonical English column names. The mapping is a closed
//! table: labels outside it are rejected instead of being written through as
//! ad-hoc field names.

use serde::{Deserialize, Serialize};

/// Storage field name for the interest flag, written only by the
/// confirm-interest flow, never via the label mapping.
pub const INTEREST_CONFIRMED: &str = "interestConfirmed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Name,
    Email,
    Company,
    Phone,
    Need,
}

impl LeadField {
    /// Maps a conversational label to its field. Unrecognized labels map to
    /// `None` and the caller fails the function call.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "nome" => Some(Self::Name),
            "email" => Some(Self::Email),
            "empresa" => Some(Self::Company),
            "telefone" => Some(Self::Phone),
            "necessidade" => Some(Self::Need),
            _ => None,
        }
    }

    /// Canonical storage field name.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Company => "company",
            Self::Phone => "phone",
            Self::Need => "need",
        }
    }
}

/// Sparse snapshot of everything collected from the user during one session.
/// `collected_fields` lists the field names present, in storage order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationData {
    pub session_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub need: Option<String>,
    pub interest_confirmed: Option<bool>,
    pub collected_fields: Vec<String>,
}

impl ConversationData {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), ..Self::default() }
    }

    /// Rebuilds the snapshot from `(field_name, field_value)` rows. Each field
    /// appears at most once; the store guarantees last-write-wins per field.
    pub fn from_rows(session_id: impl Into<String>, rows: Vec<(String, String)>) -> Self {
        let mut data = Self::new(session_id);
        for (field_name, field_value) in rows {
            match field_name.as_str() {
                "name" => data.name = Some(field_value),
                "email" => data.email = Some(field_value),
                "company" => data.company = Some(field_value),
                "phone" => data.phone = Some(field_value),
                "need" => data.need = Some(field_value),
                INTEREST_CONFIRMED => data.interest_confirmed = Some(field_value == "true"),
                _ => continue,
            }
            data.collected_fields.push(field_name);
        }
        data
    }

    pub fn has_collected(&self, field_name: &str) -> bool {
        self.collected_fields.iter().any(|collected| collected == field_name)
    }
}

/// Shape check for collected emails: `local@domain.tld`, no whitespace, a
/// single `@`, and a dot-separated domain with a non-empty last label.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((head, tld)) => !head.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_email, ConversationData, LeadField, INTEREST_CONFIRMED};

    #[test]
    fn labels_map_to_canonical_columns() {
        assert_eq!(LeadField::from_label("nome"), Some(LeadField::Name));
        assert_eq!(LeadField::from_label("Email"), Some(LeadField::Email));
        assert_eq!(LeadField::from_label(" empresa "), Some(LeadField::Company));
        assert_eq!(LeadField::from_label("telefone"), Some(LeadField::Phone));
        assert_eq!(LeadField::from_label("necessidade"), Some(LeadField::Need));
        assert_eq!(LeadField::Email.column(), "email");
    }

    #[test]
    fn unknown_labels_fail_closed() {
        assert_eq!(LeadField::from_label("cargo"), None);
        assert_eq!(LeadField::from_label("drop table"), None);
        assert_eq!(LeadField::from_label(""), None);
    }

    #[test]
    fn snapshot_rebuilds_from_rows() {
        let data = ConversationData::from_rows(
            "s-1",
            vec![
                ("name".to_string(), "Bruno".to_string()),
                ("email".to_string(), "bruno@acme.com".to_string()),
                (INTEREST_CONFIRMED.to_string(), "true".to_string()),
            ],
        );

        assert_eq!(data.name.as_deref(), Some("Bruno"));
        assert_eq!(data.email.as_deref(), Some("bruno@acme.com"));
        assert_eq!(data.interest_confirmed, Some(true));
        assert_eq!(data.collected_fields, vec!["name", "email", INTEREST_CONFIRMED]);
        assert!(data.has_collected("email"));
        assert!(!data.has_collected("phone"));
    }

    #[test]
    fn snapshot_ignores_unknown_rows() {
        let data = ConversationData::from_rows(
            "s-1",
            vec![("favorite_color".to_string(), "azul".to_string())],
        );
        assert!(data.collected_fields.is_empty());
    }

    #[test]
    fn email_shape_accepts_plausible_addresses() {
        assert!(is_valid_email("ana@empresa.com.br"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
    }

    #[test]
    fn email_shape_rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a@.b"));
        assert!(!is_valid_email("@dominio.com"));
        assert!(!is_valid_email("a b@dominio.com"));
        assert!(!is_valid_email("a@@dominio.com"));
        assert!(!is_valid_email(""));
    }
}
