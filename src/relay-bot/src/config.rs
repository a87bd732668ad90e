//! Startup configuration for the relay bot.

use std::path::{Path, PathBuf};

use anyhow::Context;
use relay_core::RelayConfig;
use relay_telegram::TelegramConfig;
use tracing::{debug, info};

/// Everything the bot needs to start.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub relay: RelayConfig,
    pub telegram: TelegramConfig,
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub edit_wait_secs: Option<u64>,
}

impl BotConfig {
    /// Layer file, environment and command line, then validate.
    ///
    /// An explicit `config_path` must exist. Otherwise the default path is
    /// used when present, and built-in defaults when not.
    pub fn load(overrides: &CliOverrides) -> anyhow::Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        Self::load_with(overrides, lookup)
    }

    pub fn load_with(
        overrides: &CliOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut relay = match overrides.config_path.as_deref() {
            Some(path) => load_file(path)?,
            None => match RelayConfig::default_path().filter(|p| p.exists()) {
                Some(path) => load_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    RelayConfig::default()
                }
            },
        };

        relay.apply_overrides(&lookup)?;
        if let Some(secs) = overrides.edit_wait_secs {
            relay.edit_wait_secs = secs;
        }
        relay.validate()?;

        let telegram = TelegramConfig::from_lookup(&lookup)?;
        telegram.validate()?;

        Ok(Self { relay, telegram })
    }
}

fn load_file(path: &Path) -> anyhow::Result<RelayConfig> {
    info!(path = %path.display(), "Loading config file");
    RelayConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_layers_file_env_and_cli() {
        let file = config_file("model = \"from-file\"\nedit_wait_secs = 4\n");
        let overrides = CliOverrides {
            config_path: Some(file.path().to_path_buf()),
            edit_wait_secs: Some(2),
        };

        let config = BotConfig::load_with(
            &overrides,
            env(&[
                ("OPENAI_SESSION", "session"),
                ("TELEGRAM_TOKEN", "123:abc"),
                ("TELEGRAM_ID", "1,2"),
                ("RELAY_MODEL", "from-env"),
            ]),
        )
        .unwrap();

        assert_eq!(config.relay.model, "from-env");
        assert_eq!(config.relay.edit_wait_secs, 2);
        assert_eq!(config.telegram.allowed_chats(), &[1, 2]);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/nonexistent/chat-relay.toml")),
            edit_wait_secs: None,
        };
        let result = BotConfig::load_with(
            &overrides,
            env(&[("OPENAI_SESSION", "s"), ("TELEGRAM_TOKEN", "1:a")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_session_token_fails() {
        let file = config_file("");
        let overrides = CliOverrides {
            config_path: Some(file.path().to_path_buf()),
            edit_wait_secs: None,
        };
        let err = BotConfig::load_with(&overrides, env(&[("TELEGRAM_TOKEN", "1:a")])).unwrap_err();
        assert!(err.to_string().contains("session"), "{err}");
    }

    #[test]
    fn test_missing_telegram_token_fails() {
        let file = config_file("");
        let overrides = CliOverrides {
            config_path: Some(file.path().to_path_buf()),
            edit_wait_secs: None,
        };
        assert!(BotConfig::load_with(&overrides, env(&[("OPENAI_SESSION", "s")])).is_err());
    }
}
