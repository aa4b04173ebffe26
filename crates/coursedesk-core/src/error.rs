//! Error types shared by the data providers and the logic components.
//!
//! Defined in `coursedesk-core` so callers can match on a failure's kind
//! (missing record, rejected input, bad credentials, unreachable backend)
//! without string matching, whichever backend produced it.

use thiserror::Error;

/// A record or input that breaks one of the model's shape rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Question content is empty or whitespace.
    #[error("question content is empty")]
    MissingContent,

    /// The question has no correct answer.
    #[error("question has no correct answer")]
    MissingCorrectAnswer,

    /// A multiple-choice answer that is not one of the options.
    #[error("correct answer '{answer}' is not one of the options")]
    AnswerNotInOptions { answer: String },

    /// More multiple-choice options than the answer sheet has slots for.
    #[error("question has {count} options; at most {max} are allowed")]
    TooManyOptions { count: usize, max: usize },

    /// Another account already uses this username.
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    /// A grade outside `0..=max_score`.
    #[error("grade {grade} is outside 0..={max_score}")]
    GradeOutOfRange { grade: f64, max_score: f64 },

    /// A required form field was left blank.
    #[error("required field '{0}' is empty")]
    MissingField(&'static str),

    /// Rejected by the backend's own validation, with its message.
    #[error("{0}")]
    Backend(String),
}

/// Errors surfaced by a [`DataProvider`](crate::traits::DataProvider).
#[derive(Debug, Error)]
pub enum DataError {
    /// Update, delete or lookup of an id that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The input was rejected before reaching storage.
    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Username/password pair did not match.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The backend was unreachable or answered with something that is not
    /// a response envelope.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The backend answered `ok: false` with its own message.
    #[error("{action} rejected by backend: {message}")]
    Rejected { action: String, message: String },

    /// An operation that needs a logged-in session was called without one.
    #[error("not logged in")]
    NotLoggedIn,

    /// The logged-in user has the wrong role for the operation.
    #[error("operation requires the {0} role")]
    WrongRole(&'static str),

    /// Local persistence (the memory provider's data file) failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DataError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DataError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns `true` if the same call might succeed when issued again.
    ///
    /// Providers never retry on their own; this is for callers that choose to.
    pub fn is_transient(&self) -> bool {
        matches!(self, DataError::TransportFailure(_))
    }
}

/// Shorthand for results returned by data providers.
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_data_error() {
        let err: DataError = ValidationError::MissingContent.into();
        assert!(matches!(
            err,
            DataError::ValidationFailed(ValidationError::MissingContent)
        ));
        assert_eq!(err.to_string(), "validation failed: question content is empty");
    }

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(DataError::TransportFailure("connection reset".into()).is_transient());
        assert!(!DataError::InvalidCredentials.is_transient());
        assert!(!DataError::not_found("class", "c9").is_transient());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = DataError::not_found("submission", "sub-1");
        assert_eq!(err.to_string(), "submission not found: sub-1");
    }
}
