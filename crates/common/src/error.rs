use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid period {period} for series of length {len}")]
    InvalidPeriod { period: usize, len: usize },

    #[error("Insufficient data: need {needed} values, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Temporary lockouts, rate-limit responses and network failures.
    /// The only class of error the retry policy will repeat.
    #[error("Transient exchange error: {0}")]
    TransientExchange(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Persisted state error: {0}")]
    PersistedState(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientExchange(_))
    }

    /// Indicator preconditions. A cycle hitting one of these holds.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::InvalidPeriod { .. } | Error::InsufficientData { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
