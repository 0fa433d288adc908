use crate::remote::DType;

pub type JoinResult<T> = Result<T, JoinError>;

/// Error produced by a caller-supplied predicate.
pub type PredicateError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("shape mismatch for {what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("type mismatch for {array}: expected {expected}, got {actual}")]
    TypeMismatch {
        array: String,
        expected: DType,
        actual: DType,
    },

    #[error("domain error: {0}")]
    Domain(String),

    #[error("error evaluating predicate")]
    PredicateEvaluation {
        #[source]
        source: PredicateError,
    },

    #[error("unknown array handle: {0}")]
    UnknownHandle(String),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("transport error")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl JoinError {
    pub(crate) fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        JoinError::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }

    pub(crate) fn predicate(source: impl Into<PredicateError>) -> Self {
        JoinError::PredicateEvaluation {
            source: source.into(),
        }
    }
}
