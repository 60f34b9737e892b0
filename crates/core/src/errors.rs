use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of ledger failures, independent of message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidInput,
    NotFullyPaid,
    InvalidState,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::InvalidInput => "invalid_input",
            Self::NotFullyPaid => "not_fully_paid",
            Self::InvalidState => "invalid_state",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{resource} `{id}` was not found")]
    NotFound { resource: &'static str, id: String },
    #[error("actor `{actor_id}` is not allowed to {action}")]
    Forbidden { actor_id: String, action: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("order `{order_id}` is not fully paid: {remaining} remaining")]
    NotFullyPaid { order_id: String, remaining: Decimal },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFullyPaid { .. } => ErrorKind::NotFullyPaid,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Only store failures are worth retrying; every other kind is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn order_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { resource: "order", id: id.into() }
    }

    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { resource: "journal entry", id: id.into() }
    }

    pub fn tenant_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { resource: "tenant", id: id.into() }
    }
}
