//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use gantry_config::ConfigError;
use gantry_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REMOTE: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to daemon at {url}")]
    #[diagnostic(
        code(gantry::connection_failed),
        help(
            "{reason}\n\
             Check that the daemon is running and reachable, or raise --connect-timeout."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Lost the connection to the daemon")]
    #[diagnostic(
        code(gantry::disconnected),
        help("The request was not delivered. Retry once the daemon is reachable.")
    )]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Daemon rejected the token for profile '{profile}'")]
    #[diagnostic(
        code(gantry::auth_failed),
        help(
            "{reason}\n\
             Verify the token, or store a new one in the keyring under 'gantry / {profile}/token'."
        )
    )]
    AuthFailed { profile: String, reason: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(gantry::no_credentials),
        help(
            "Pass --token, set GANTRY_TOKEN, or add `token_env` / `token` to the profile.\n\
             Tokens can also live in the system keyring as 'gantry / {profile}/token'."
        )
    )]
    NoCredentials { profile: String },

    // ── Daemon ───────────────────────────────────────────────────────
    #[error("Daemon rejected {operation}: {message}")]
    #[diagnostic(code(gantry::remote))]
    Remote { operation: String, message: String },

    #[error("Protocol error: {message}")]
    #[diagnostic(
        code(gantry::protocol),
        help("The daemon answered with something this client does not understand.")
    )]
    Protocol { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("{operation} timed out after {millis}ms")]
    #[diagnostic(
        code(gantry::timeout),
        help("Raise the budget under [profiles.<name>.timeouts] or check daemon load.")
    )]
    Timeout { operation: String, millis: u128 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(gantry::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(gantry::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one under [profiles.{name}] in the config file."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No daemon configured")]
    #[diagnostic(
        code(gantry::no_config),
        help(
            "Pass --daemon and --token, or create a profile.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Could not load configuration: {message}")]
    #[diagnostic(code(gantry::config))]
    ConfigLoad { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(gantry::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Remote { .. } => exit_code::REMOTE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotConnected | CoreError::SessionClosed => CliError::Disconnected,

            CoreError::Timeout { operation, timeout } => CliError::Timeout {
                operation: operation.to_string(),
                millis: timeout.as_millis(),
            },

            CoreError::Remote { operation, message } => CliError::Remote {
                operation: operation.to_string(),
                message,
            },

            CoreError::MalformedMessage { reason } => CliError::Protocol { message: reason },

            err @ CoreError::UnexpectedReply { .. } => CliError::Protocol {
                message: err.to_string(),
            },

            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed {
                url: "(daemon)".into(),
                reason,
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Protocol { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Figment(e) => CliError::ConfigLoad {
                message: e.to_string(),
            },
        }
    }
}
