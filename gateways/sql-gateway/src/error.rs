//! Error types for the SQL gateway

use gateway_common::FailureKind;
use thiserror::Error;

/// Reasons a candidate query is rejected before it reaches the database
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Only read-only SELECT queries are allowed (found forbidden keyword {0})")]
    ForbiddenKeyword(String),

    #[error("Query must start with SELECT")]
    NotASelect,

    #[error("SQL comments are not allowed")]
    CommentNotAllowed,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {cause}")]
    Execution { cause: String },

    #[error("Connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },
}

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        GatewayError::Config(message.into())
    }

    /// Wrap any underlying failure as an execution error, keeping its message
    pub fn execution(cause: impl std::fmt::Display) -> Self {
        GatewayError::Execution {
            cause: cause.to_string(),
        }
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::execution(err)
    }
}

impl FailureKind for GatewayError {
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config",
            GatewayError::Validation(_) => "validation",
            GatewayError::Execution { .. } => "execution",
            GatewayError::PoolExhausted { .. } => "pool_exhausted",
        }
    }

    fn is_caller_error(&self) -> bool {
        matches!(self, GatewayError::Validation(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
