use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("insufficient credits: have {available}, need {requested}")]
    InsufficientCredits { available: i64, requested: i64 },

    #[error("invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("validation: {0}")]
    Validation(String),

    #[error("webhook auth: {0}")]
    WebhookAuth(String),

    #[error("payment oracle: {0}")]
    Oracle(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
