//! Translation error taxonomy
//!
//! Every variant is a deterministic configuration or programming error
//! raised at model/query construction time. None of them is retryable.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Invalid window specification: {0}")]
    InvalidWindowSpec(String),

    #[error("A window has already been applied to this query")]
    MultipleWindowSpec,

    #[error("Invalid emit mode: {0}")]
    InvalidEmitMode(String),

    #[error("Grouped projection must include the group key: {0}")]
    MissingGroupKeyProjection(String),

    #[error("Pull query requires an equality predicate on a key column: {0}")]
    PullQueryMissingKey(String),

    #[error("Column '{column}' is not declared on entity '{entity}'")]
    UnknownColumn { entity: String, column: String },
}

impl TranslationError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        TranslationError::UnsupportedExpression(msg.into())
    }
}

pub type Result<T, E = TranslationError> = std::result::Result<T, E>;
