//! Error types for shellrig.
//!
//! Errors are tagged by the operation that produced them rather than by a
//! type hierarchy, so callers can apply uniform retry policies: retry on
//! `timeout`, abort on `auth`, and so on. Transport collaborators (SSH,
//! Telnet, local processes) surface their setup failures through the same
//! shape via the `dial`/`auth`/`session`/`term`/`shell`/`sftp` tags.

use thiserror::Error;

/// A specialized `Result` type for shellrig operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all shellrig operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Stream I/O failure on the output stream, or a non-empty residual
    /// stderr payload collected during shutdown.
    #[error("read error: {0}")]
    Read(String),

    /// The configured deadline elapsed before the operation completed.
    #[error("context deadline exceeded")]
    Timeout,

    /// The operation was canceled through a [`CancelHandle`](crate::engine::CancelHandle).
    #[error("operation canceled")]
    Canceled,

    /// Failed to establish a transport connection.
    #[error("dial error: {message}, addr={addr}")]
    Dial {
        /// The remote address of the connection attempt.
        addr: String,
        /// Description of the failure.
        message: String,
    },

    /// Transport authentication failure.
    #[error("auth error: {0}")]
    Auth(String),

    /// Transport session setup or lifecycle failure.
    #[error("session error: {0}")]
    Session(String),

    /// Failed to allocate or configure a terminal.
    #[error("term error: {0}")]
    Term(String),

    /// Failed to spawn or control a shell process.
    #[error("shell error: {0}")]
    Shell(String),

    /// SFTP subsystem failure.
    #[error("sftp error: {0}")]
    Sftp(String),

    /// A caller-supplied pattern failed to compile. Reported at rule
    /// construction time, never deferred to match time.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    /// The operation tag for this error.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::Dial { .. } => "dial",
            Self::Auth(_) => "auth",
            Self::Session(_) => "session",
            Self::Term(_) => "term",
            Self::Shell(_) => "shell",
            Self::Sftp(_) => "sftp",
            Self::Pattern(_) => "pattern",
        }
    }

    /// Whether this error is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Whether this error is an external cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Read(err.to_string())
    }
}
