use thiserror::Error;

/// Discriminant used by boundaries that dispatch on failure class (HTTP
/// status mapping, function-outcome folding) without matching the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Integration,
    Internal,
}

/// Application failure taxonomy. One tagged enum instead of an error class
/// hierarchy: callers branch on [`ErrorKind`], messages stay user-facing
/// Portuguese for the validation/not-found kinds.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{system} integration error: {message}")]
    Integration { system: String, message: String },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn integration(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Integration { system: system.into(), message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Integration { .. } => ErrorKind::Integration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show the user. Validation/not-found messages are
    /// user-correctable and pass through; downstream and internal failures
    /// collapse to a generic retry prompt so internals never leak.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::NotFound(message) => message.clone(),
            Self::Integration { .. } | Self::Internal(_) => {
                "Erro ao processar mensagem. Por favor, tente novamente.".to_string()
            }
        }
    }
}
