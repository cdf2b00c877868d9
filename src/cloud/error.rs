//! Errors surfaced by cloud client implementations.

use thiserror::Error;

use crate::exec::ExecError;

/// Error codes the provider returns for resources that do not exist (yet).
const NOT_FOUND_CODES: &[&str] = &["Ecs.0114", "Ecs.0614"];

/// Errors raised by [`super::CloudClient`] operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// The CLI could not be executed or failed without a structured body.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// The provider rejected the request.
    #[error("{operation} rejected ({code}): {message}")]
    Api {
        /// Provider operation that failed.
        operation: String,
        /// HTTP status when the provider reported one.
        status: Option<u16>,
        /// Provider error code (for example `Ecs.0114`).
        code: String,
        /// Provider error message.
        message: String,
    },
    /// The CLI succeeded but its output could not be interpreted.
    #[error("failed to parse {operation} response: {message}")]
    Parse {
        /// Provider operation whose response was malformed.
        operation: String,
        /// Parser error message.
        message: String,
    },
}

impl CloudError {
    /// Returns `true` when the provider reported that the resource does not
    /// exist, either because it was already removed or because it is not
    /// visible yet.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        let Self::Api {
            status,
            code,
            message,
            ..
        } = self
        else {
            return false;
        };
        *status == Some(404)
            || code.to_ascii_lowercase().contains("notfound")
            || NOT_FOUND_CODES.contains(&code.as_str())
            || message.to_ascii_lowercase().contains("not found")
    }
}
