use thiserror::Error;

/// Top-level error type for the `nukly-api` crate.
///
/// Covers every failure mode across the bridge, discovery, and web API
/// surfaces. `nukly-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Pairing refused, or the bridge rejected the token (HTTP 401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Non-success HTTP status that is not an auth failure.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Bridge ──────────────────────────────────────────────────────
    /// The bridge answered, but reported `success: false`.
    #[error("Bridge action failed: {message}")]
    ActionFailed { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A device identifier that cannot be interpreted numerically.
    #[error("Invalid device identifier: {0}")]
    InvalidIdentifier(String),
}

impl Error {
    /// Returns `true` if the bridge rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a `reqwest` send error, folding timeouts into [`Error::Timeout`].
    pub(crate) fn from_send(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }
}
