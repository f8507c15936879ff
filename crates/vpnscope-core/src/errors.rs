use crate::key::KeyError;
use thiserror::Error;

/// Failures a reputation source reports for infrastructure problems.
///
/// "The key is clean" is never an error; sources report that as a negative answer. Each
/// variant is classified as hard or soft:
/// - Hard failures mean the source is structurally broken (credential missing or rejected,
///   source disabled on the provider side). The source is cooled down or disabled.
/// - Soft failures are one-off misses (bad payload, transient network error, quota).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceError {
    /// The source needs a credential and none is configured.
    #[error("credential is not configured for {0}")]
    MissingCredential(String),

    /// The provider rejected the configured credential.
    #[error("credential rejected: {0}")]
    InvalidCredential(String),

    /// The source is disabled, locally or by the provider.
    #[error("source disabled: {0}")]
    Disabled(String),

    /// Non-2xx HTTP response.
    ///
    /// First field is the HTTP status code, second is the error message.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Response payload could not be parsed or carried an error message.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The daily request quota for this source is used up.
    #[error("quota exceeded ({limit} requests per window)")]
    QuotaExceeded { limit: u64 },

    /// The source cannot answer for this kind of key.
    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    /// Catch-all for plugin-specific failures.
    #[error("{message}")]
    Other { message: String, hard: bool },
}

impl SourceError {
    /// Returns `true` if the failure means the source is structurally broken.
    ///
    /// HTTP 401/403 count as credential rejections.
    #[must_use]
    pub fn is_hard(&self) -> bool {
        match self {
            Self::MissingCredential(_) | Self::InvalidCredential(_) | Self::Disabled(_) => true,
            Self::HttpStatus(status, _) => matches!(status, 401 | 403),
            Self::Other { hard, .. } => *hard,
            Self::InvalidResponse(_) |
            Self::Network(_) |
            Self::QuotaExceeded { .. } |
            Self::UnsupportedKey(_) => false,
        }
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_metric_str(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::Disabled(_) => "disabled",
            Self::HttpStatus(_, _) => "http_status",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Network(_) => "network",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::UnsupportedKey(_) => "unsupported_key",
            Self::Other { .. } => "other",
        }
    }
}

/// Errors returned synchronously by the public check API.
///
/// Per-source failures never surface here; they are folded into the verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),
}
