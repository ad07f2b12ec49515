//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use nukly_config::ConfigError;
use nukly_core::CoreError;

/// Process exit codes. `2` is left to clap for usage errors.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFIG: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("Bridge {id} refused pairing: {message}")]
    #[diagnostic(
        code(nukly::pairing_refused),
        help(
            "Press the button on the bridge until its LED lights up,\n\
             then run the command again within 30 seconds."
        )
    )]
    PairingRefused { id: u64, message: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(nukly::auth_failed),
        help("The stored token is no longer valid. Run: nukly unpair <id> && nukly pair ...")
    )]
    AuthFailed { message: String },

    #[error("Could not reach {target}: {message}")]
    #[diagnostic(
        code(nukly::connection_failed),
        help("Check that the bridge is powered and on the same network.")
    )]
    ConnectionFailed { target: String, message: String },

    #[error("Bridge {id} is not stored")]
    #[diagnostic(code(nukly::not_found), help("Run: nukly bridges"))]
    BridgeNotFound { id: u64 },

    #[error(transparent)]
    #[diagnostic(code(nukly::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(nukly::core))]
    Core(CoreError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(nukly::io))]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { message } => Self::AuthFailed { message },
            CoreError::Transport { message } => Self::ConnectionFailed {
                target: "bridge".into(),
                message,
            },
            other => Self::Core(other),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PairingRefused { .. } | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::BridgeNotFound { .. } => exit_code::NOT_FOUND,
            Self::Config(_) | Self::Core(CoreError::Configuration { .. }) => exit_code::CONFIG,
            Self::Core(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}
