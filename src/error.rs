//! Error taxonomy shared by the auth core and the API client.
//!
//! Every async operation reports failure through one of these variants so the
//! driving layer can render a distinct message per kind without inspecting
//! free-text strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or empty user input, caught locally before any network call.
    #[error("{0}")]
    Validation(String),
    /// Backend unreachable, or an unexpected non-2xx during a login step.
    #[error("security engine unreachable: {0}")]
    Connectivity(String),
    /// The backend explicitly rejected credentials, code, or request.
    #[error("{0}")]
    Rejected(String),
    /// An authenticated call came back 401; the session is no longer valid.
    #[error("session expired")]
    SessionExpired,
    /// A login attempt was cancelled or superseded while its network call
    /// was in flight; the late result was discarded.
    #[error("login attempt cancelled")]
    Cancelled,
    /// Broken environment or programming error. Not recoverable.
    #[error("invariant violation: {0}")]
    Invariant(String),
    /// Missing or unusable client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// The session store could not be read or written.
    #[error("session store: {0}")]
    Store(String),
}

impl Error {
    /// True when retrying the same step without changes may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Rejected(_))
    }
}
