// ── Core error types ──
//
// Errors surfaced by the reconciliation layer. Consumers never see HTTP
// status codes or JSON parse failures directly; `From<nukly_api::Error>`
// folds them into the categories below, each of which has a distinct
// recovery policy in the coordinator.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Bridge communication ─────────────────────────────────────────
    /// Connection refused, timeout, or a non-2xx answer. Retried on the
    /// next pass.
    #[error("Bridge unreachable: {message}")]
    Transport { message: String },

    /// The bridge rejected the stored credential. The bridge is removed
    /// from the registry and re-paired.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The bridge answered but refused the action. Returned to the caller
    /// of the action, never retried.
    #[error("Action failed: {message}")]
    ActionFailure { message: String },

    // ── Local ────────────────────────────────────────────────────────
    /// Unreadable registry store, unknown device type, malformed payload.
    /// Fatal to the affected bridge or device only.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The callback listener could not bind its port.
    #[error("Cannot bind callback server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },
}

impl CoreError {
    /// Returns `true` for errors that a later pass may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Bind { .. })
    }

    pub(crate) fn storage(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.display().to_string(),
            source,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<nukly_api::Error> for CoreError {
    fn from(err: nukly_api::Error) -> Self {
        match err {
            nukly_api::Error::Authentication { message } => CoreError::Authentication { message },
            nukly_api::Error::ActionFailed { message } => CoreError::ActionFailure { message },
            nukly_api::Error::Transport(e) => CoreError::Transport {
                message: e.to_string(),
            },
            nukly_api::Error::Timeout { timeout_secs } => CoreError::Transport {
                message: format!("request timed out after {timeout_secs}s"),
            },
            nukly_api::Error::Http { status, message } => CoreError::Transport {
                message: format!("HTTP {status}: {message}"),
            },
            nukly_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("invalid URL: {e}"),
            },
            nukly_api::Error::Deserialization { message, body: _ } => CoreError::Configuration {
                message: format!("unexpected response: {message}"),
            },
            nukly_api::Error::InvalidIdentifier(id) => CoreError::Configuration {
                message: format!("invalid device identifier {id}"),
            },
        }
    }
}

impl From<nukly_api::UnknownDeviceType> for CoreError {
    fn from(err: nukly_api::UnknownDeviceType) -> Self {
        CoreError::Configuration {
            message: err.to_string(),
        }
    }
}
