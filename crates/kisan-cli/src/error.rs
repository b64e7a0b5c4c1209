use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] kisan_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Classified(#[from] kisan_core::ClassifiedError),

    #[error("strict mode failed: result served from the {tier} tier")]
    StrictModeViolation { tier: String },

    #[error(transparent)]
    Store(#[from] kisan_store::StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Classified(error) if error.kind() == kisan_core::ErrorKind::Validation => 2,
            Self::Classified(_) => 3,
            Self::Serialization(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::Store(_) => 6,
            Self::Io(_) => 10,
        }
    }
}

impl From<kisan_core::CoreError> for CliError {
    fn from(error: kisan_core::CoreError) -> Self {
        match error {
            kisan_core::CoreError::Validation(error) => Self::Validation(error),
            kisan_core::CoreError::Store(error) => Self::Store(error),
            kisan_core::CoreError::Serialization(error) => Self::Serialization(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use kisan_core::{ClassifiedError, CoreError, ValidationError};

    use super::*;

    #[test]
    fn exit_codes_separate_user_errors_from_service_errors() {
        let invalid = CliError::from(ValidationError::EmptyField { field: "crop" });
        assert_eq!(invalid.exit_code(), 2);

        let rejected = CliError::from(ClassifiedError::validation("price out of range"));
        assert_eq!(rejected.exit_code(), 2);

        let offline = CliError::from(ClassifiedError::no_connectivity("no route to host"));
        assert_eq!(offline.exit_code(), 3);

        let strict = CliError::StrictModeViolation {
            tier: String::from("fallback"),
        };
        assert_eq!(strict.exit_code(), 5);
        assert_eq!(strict.to_string(), "strict mode failed: result served from the fallback tier");
    }

    #[test]
    fn core_errors_keep_their_category() {
        let error = CliError::from(CoreError::Validation(ValidationError::EmptyIdempotencyKey));
        assert!(matches!(error, CliError::Validation(_)));
    }
}
