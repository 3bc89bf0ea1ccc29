//! Error classification shared by gateways
//!
//! Every failure a gateway reports to its caller carries a short, stable
//! `kind` tag next to the human readable message, so callers can branch on
//! the category (e.g. back off on pool pressure) without parsing text.

use std::fmt::Display;

/// Trait for errors that can be reported through the response envelope
///
/// # Example
///
/// ```rust,ignore
/// use gateway_common::FailureKind;
///
/// impl FailureKind for MyError {
///     fn kind(&self) -> &'static str {
///         match self {
///             MyError::BadInput(_) => "validation",
///             MyError::Io(_) => "execution",
///         }
///     }
/// }
/// ```
pub trait FailureKind: Display {
    /// Stable, snake_case category tag
    fn kind(&self) -> &'static str;

    /// Whether the caller can fix the failure by changing its request
    fn is_caller_error(&self) -> bool {
        false
    }
}

impl FailureKind for serde_json::Error {
    fn kind(&self) -> &'static str {
        "serialization"
    }
}
