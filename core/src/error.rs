use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Ticket '{ticket_id}' not found")]
    NotFound { ticket_id: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Notification delivery failed: {reason}")]
    Notify { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SlaResult<T> = Result<T, SlaError>;
