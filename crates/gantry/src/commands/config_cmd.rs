//! Config subcommand handlers.

use gantry_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Copy of the config that is safe to print.
fn redacted(mut cfg: Config) -> Config {
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
    cfg
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&gantry_config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = gantry_config::load_config()?;
            let format = config::output_format(global, &cfg);
            let cfg = redacted(cfg);
            let out = match format {
                OutputFormat::Json => output::render_json(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                        field: "config".into(),
                        reason: format!("failed to serialize config: {e}"),
                    })?
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use gantry_config::Profile;

    use super::*;

    #[test]
    fn tokens_are_redacted() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "node1".into(),
            Profile {
                daemon: "wss://node1.example.com/api/ws".into(),
                token: Some("super-secret".into()),
                token_env: Some("NODE1_TOKEN".into()),
                ..Profile::default()
            },
        );
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                daemon: "ws://10.0.0.5:8080/api/ws".into(),
                ..Profile::default()
            },
        );

        let cfg = redacted(cfg);
        assert_eq!(cfg.profiles["node1"].token.as_deref(), Some(REDACTED));
        assert_eq!(cfg.profiles["node1"].token_env.as_deref(), Some("NODE1_TOKEN"));
        assert_eq!(cfg.profiles["lab"].token, None);
    }
}
