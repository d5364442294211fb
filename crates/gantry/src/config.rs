//! Translation from CLI flags + profiles to `gantry_core::SessionConfig`.
//!
//! File loading and token lookup live in `gantry-config`; this module only
//! layers the command-line overrides on top.

use std::time::Duration;

use secrecy::SecretString;

use gantry_config::{Config, ConfigError, Profile};
use gantry_core::SessionConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Everything a connected command needs to know about its target.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub session: SessionConfig,
    pub connect_timeout: Duration,
}

/// Build a session config from the config file, profile, and CLI overrides.
pub fn resolve(global: &GlobalOpts, config: &Config) -> Result<Resolved, CliError> {
    let profile_name = config.active_profile_name(global.profile.as_deref());
    let connect_timeout =
        Duration::from_secs(global.connect_timeout.unwrap_or(config.defaults.connect_timeout));

    let session = match config.profiles.get(&profile_name) {
        Some(profile) => resolve_profile(profile, &profile_name, global)?,

        // A profile named explicitly must exist.
        None if global.profile.is_some() => {
            return Err(ConfigError::ProfileNotFound {
                name: profile_name,
                available: config.profiles.keys().cloned().collect(),
            }
            .into());
        }

        // No profile -- build from flags / env vars alone.
        None => {
            let daemon = global.daemon.as_deref().ok_or_else(|| CliError::NoConfig {
                path: gantry_config::config_path().display().to_string(),
            })?;
            let token = global.token.clone().ok_or_else(|| CliError::NoCredentials {
                profile: profile_name.clone(),
            })?;
            let url = gantry_config::parse_daemon_url(daemon)?;
            SessionConfig::new(url, SecretString::from(token))
        }
    };

    Ok(Resolved {
        profile_name,
        session,
        connect_timeout,
    })
}

fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<SessionConfig, CliError> {
    // 1. Token (flag > env > profile chain)
    let credential = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => gantry_config::resolve_token(profile, profile_name)?,
    };

    // 2. Daemon URL (flag > env > profile)
    let mut config = gantry_config::build_session_config(profile, credential)?;
    if let Some(ref daemon) = global.daemon {
        config.daemon_url = gantry_config::parse_daemon_url(daemon)?;
    }
    Ok(config)
}

/// Output format: flag > env > `[defaults].output` > table.
pub fn output_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        match config.defaults.output.to_ascii_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "plain" => OutputFormat::Plain,
            _ => OutputFormat::Table,
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn global() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            daemon: None,
            token: None,
            connect_timeout: None,
            output: None,
            verbose: 0,
            quiet: false,
        }
    }

    fn config_with(name: &str, profile: Profile) -> Config {
        Config {
            default_profile: Some(name.into()),
            profiles: BTreeMap::from([(name.to_owned(), profile)]),
            ..Config::default()
        }
    }

    #[test]
    fn flags_alone_build_a_session() {
        let mut opts = global();
        opts.daemon = Some("ws://127.0.0.1:8080/api/ws".into());
        opts.token = Some("t0k".into());
        opts.connect_timeout = Some(3);

        let resolved = resolve(&opts, &Config::default()).unwrap();
        assert_eq!(resolved.session.daemon_url.as_str(), "ws://127.0.0.1:8080/api/ws");
        assert_eq!(resolved.session.credential.expose_secret(), "t0k");
        assert_eq!(resolved.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn missing_daemon_without_profile_is_no_config() {
        let err = resolve(&global(), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn missing_token_without_profile_is_no_credentials() {
        let mut opts = global();
        opts.daemon = Some("ws://127.0.0.1:8080/api/ws".into());
        let err = resolve(&opts, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoCredentials { .. }));
    }

    #[test]
    fn unknown_explicit_profile_is_reported() {
        let mut opts = global();
        opts.profile = Some("prod".into());
        opts.daemon = Some("ws://127.0.0.1:8080/api/ws".into());
        opts.token = Some("t0k".into());
        let config = config_with(
            "gantry-cli-test-lab",
            Profile {
                daemon: "ws://10.0.0.5:8080/api/ws".into(),
                token: Some("plain".into()),
                ..Profile::default()
            },
        );

        let err = resolve(&opts, &config).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { ref name, .. } if name == "prod"));
    }

    #[test]
    fn flags_override_profile_values() {
        let name = "gantry-cli-test-node1";
        let config = config_with(
            name,
            Profile {
                daemon: "wss://node1.example.com/api/ws".into(),
                token: Some("from-file".into()),
                ..Profile::default()
            },
        );

        let resolved = resolve(&global(), &config).unwrap();
        assert_eq!(resolved.profile_name, name);
        assert_eq!(resolved.session.credential.expose_secret(), "from-file");
        assert_eq!(resolved.connect_timeout, Duration::from_secs(10));

        let mut opts = global();
        opts.daemon = Some("ws://127.0.0.1:9000/api/ws".into());
        opts.token = Some("from-flag".into());
        let resolved = resolve(&opts, &config).unwrap();
        assert_eq!(resolved.session.daemon_url.as_str(), "ws://127.0.0.1:9000/api/ws");
        assert_eq!(resolved.session.credential.expose_secret(), "from-flag");
    }

    #[test]
    fn non_websocket_url_is_rejected() {
        let mut opts = global();
        opts.daemon = Some("https://node1.example.com".into());
        opts.token = Some("t0k".into());
        let err = resolve(&opts, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn output_falls_back_to_config_default() {
        let mut config = Config::default();
        config.defaults.output = "json".into();
        assert_eq!(output_format(&global(), &config), OutputFormat::Json);

        let mut opts = global();
        opts.output = Some(OutputFormat::Plain);
        assert_eq!(output_format(&opts, &config), OutputFormat::Plain);

        assert_eq!(output_format(&global(), &Config::default()), OutputFormat::Table);
    }
}
