//! Shared configuration for gantry tools.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `gantry_core::SessionConfig`. Core never reads files;
//! the CLI loads a profile here and hands the result to `Session`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use gantry_core::{OperationTimeouts, ReconnectConfig, SessionConfig};

/// Keyring service name; entries are `<profile>/token`.
pub const KEYRING_SERVICE: &str = "gantry";

/// Prefix for environment overrides, e.g. `GANTRY_DEFAULTS__OUTPUT=json`.
pub const ENV_PREFIX: &str = "GANTRY_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named daemon profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Pick the profile name: explicit choice, then `default_profile`,
    /// then `"default"`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profiles.keys().cloned().collect(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Output format: "table", "json", or "plain".
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds to wait for the first connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_connect_timeout() -> u64 {
    10
}

/// A named daemon profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Daemon WebSocket endpoint (e.g., "wss://node1.example.com:8080/api/ws").
    pub daemon: String,

    /// Bearer token (plaintext -- prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub timeouts: TimeoutOverrides,
}

/// Reconnect backoff overrides, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ReconnectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// Per-operation reply budget overrides, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct TimeoutOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_write_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "gantry", "gantry").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("gantry");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token for a profile.
///
/// Order: the variable named by `token_env`, the system keyring entry
/// `gantry / <profile>/token`, then the plaintext `token`.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, |name| std::env::var(name).ok())
}

/// [`resolve_token`] with a caller-supplied environment lookup.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env -> env var lookup
    if let Some(value) = profile.token_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(value));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation to SessionConfig ────────────────────────────────────

/// Parse and check a daemon endpoint. Only `ws` and `wss` are accepted.
pub fn parse_daemon_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: "daemon".into(),
        reason: format!("{raw}: {e}"),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "daemon".into(),
            reason: format!("expected a ws:// or wss:// URL, got scheme '{other}'"),
        }),
    }
}

fn positive_ms(field: &str, value: Option<u64>, fallback: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(fallback),
        Some(0) => Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        }),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

impl ReconnectSettings {
    pub fn to_reconnect_config(self) -> Result<ReconnectConfig, ConfigError> {
        let defaults = ReconnectConfig::default();
        let initial_delay = positive_ms(
            "reconnect.initial_delay_ms",
            self.initial_delay_ms,
            defaults.initial_delay,
        )?;
        let max_delay = positive_ms("reconnect.max_delay_ms", self.max_delay_ms, defaults.max_delay)?;
        if initial_delay > max_delay {
            return Err(ConfigError::Validation {
                field: "reconnect".into(),
                reason: "initial_delay_ms exceeds max_delay_ms".into(),
            });
        }
        Ok(ReconnectConfig {
            initial_delay,
            max_delay,
        })
    }
}

impl TimeoutOverrides {
    pub fn to_operation_timeouts(self) -> Result<OperationTimeouts, ConfigError> {
        let d = OperationTimeouts::default();
        Ok(OperationTimeouts {
            listing: positive_ms("timeouts.listing_ms", self.listing_ms, d.listing)?,
            mutation: positive_ms("timeouts.mutation_ms", self.mutation_ms, d.mutation)?,
            read: positive_ms("timeouts.read_ms", self.read_ms, d.read)?,
            write: positive_ms("timeouts.write_ms", self.write_ms, d.write)?,
            binary_write: positive_ms("timeouts.binary_write_ms", self.binary_write_ms, d.binary_write)?,
        })
    }
}

/// Build a `SessionConfig` from a profile and an already-resolved token.
pub fn build_session_config(
    profile: &Profile,
    credential: SecretString,
) -> Result<SessionConfig, ConfigError> {
    let daemon_url = parse_daemon_url(&profile.daemon)?;
    Ok(SessionConfig {
        daemon_url,
        credential,
        reconnect: profile.reconnect.to_reconnect_config()?,
        timeouts: profile.timeouts.to_operation_timeouts()?,
    })
}

/// Build a `SessionConfig` from a profile, resolving its token.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<SessionConfig, ConfigError> {
    let credential = resolve_token(profile, profile_name)?;
    build_session_config(profile, credential)
}

// ── Tests ────────────────────────────────────────────────────────────
