//! Text replies handed back to language models.
//!
//! Tools never fail towards the model. A failure is rendered as text that
//! starts with [`ERROR_MARKER`] so the caller can branch on the prefix and
//! retry with corrected input.

use std::fmt::Display;

/// Prefix carried by every failure reply
pub const ERROR_MARKER: &str = "[ERROR]";

/// Render an error as marker-prefixed reply text
pub fn error_text(err: impl Display) -> String {
    format!("{} {}", ERROR_MARKER, err)
}

/// Whether a reply reports a failure
pub fn is_error_text(reply: &str) -> bool {
    reply.trim_start().starts_with(ERROR_MARKER)
}

/// Flatten a typed result into reply text, logging the failure.
pub fn into_reply<T, E, F>(operation: &str, result: Result<T, E>, on_success: F) -> String
where
    E: Display,
    F: FnOnce(T) -> String,
{
    match result {
        Ok(value) => on_success(value),
        Err(err) => {
            tracing::error!(operation, error = %err, "Operation failed");
            error_text(err)
        }
    }
}
