use thiserror::Error;

/// Validation and contract errors exposed by `kisan-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid coordinate: {field} {value} is outside [{min}, {max}]")]
    InvalidCoordinate {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("invalid demand level '{value}', expected one of low, medium, high")]
    InvalidDemandLevel { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z) or YYYY-MM-DD: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("search radius must be a finite, non-negative number of km: {value}")]
    InvalidRadius { value: f64 },

    #[error("idempotency key cannot be empty")]
    EmptyIdempotencyKey,

    #[error("invalid value '{value}' for {key}")]
    InvalidConfig { key: &'static str, value: String },
}

/// Top-level error for local setup operations (opening the queue, seeding data).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] kisan_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
