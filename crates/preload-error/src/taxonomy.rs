//! The four terminal failure kinds.

use thiserror::Error;

/// Terminal failure kinds for a preload run.
///
/// The variants are ordered by where they arise: configuration resolution,
/// credential exchange, recognized remote/engine failures, and everything
/// else. The error classifier matches on this enum exhaustively to pick the
/// user-facing message and the process exit status.
#[derive(Debug, Error)]
pub enum PreloadError {
    /// Bad or missing configuration.
    ///
    /// Surfaced immediately by the option resolver; no provisioning is
    /// attempted after one of these.
    #[error("{0}")]
    Usage(String),

    /// Credential exchange with the remote API failed.
    ///
    /// Never retried. Surfaced as a concise message without a debug dump.
    #[error("{0}")]
    Auth(String),

    /// A recognized failure reported by the remote API or the preload
    /// engine (missing application, invalid commit, architecture mismatch).
    ///
    /// Surfaced as a one-line `Error: <message>` without a stack trace.
    #[error("{0}")]
    Domain(String),

    /// Anything else, including programming errors.
    ///
    /// Surfaced in full structural detail together with a bug-report
    /// pointer. When `code` is a valid positive integer the process exits
    /// with it, else with status 1.
    #[error("{report}")]
    Unexpected {
        report: anyhow::Error,
        code: Option<i32>,
    },
}

impl PreloadError {
    /// Creates a usage error.
    #[must_use]
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Creates an auth error.
    #[must_use]
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates a domain error.
    #[must_use]
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    /// Wraps an arbitrary error as unexpected, without an embedded status.
    #[must_use]
    pub fn unexpected(report: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected {
            report: report.into(),
            code: None,
        }
    }

    /// Wraps an arbitrary error as unexpected with an embedded exit status.
    #[must_use]
    pub fn unexpected_with_code(report: impl Into<anyhow::Error>, code: i32) -> Self {
        Self::Unexpected {
            report: report.into(),
            code: Some(code),
        }
    }

    /// Returns true if this is a usage error.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Returns true if this is an auth error.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Returns true if this is a domain error.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }

    /// Returns true if this is an unexpected error.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected { .. })
    }
}
