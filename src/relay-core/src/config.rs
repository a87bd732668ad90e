//! Relay configuration.
//!
//! Values come from an optional TOML file, then environment overrides. The
//! binary applies its command-line flags last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::retry::RetryPolicy;
use crate::sse::DEFAULT_TERMINAL_TOKEN;

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Streaming conversation endpoint.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Endpoint exchanging the session token for an access token.
    #[serde(default = "default_session_url")]
    pub session_url: String,

    /// Long-lived session token. Never serialized.
    #[serde(default, skip_serializing)]
    pub session_token: Option<SecretString>,

    #[serde(default = "default_model")]
    pub model: String,

    /// User-Agent sent to the backend.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Event payload that ends a stream.
    #[serde(default = "default_terminal_token")]
    pub terminal_token: String,

    /// Timeout for opening a turn stream, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for a credential refresh, in seconds.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,

    /// Minimum gap between live edits, in seconds.
    #[serde(default = "default_edit_wait")]
    pub edit_wait_secs: u64,

    /// Gap between typing indicators, in seconds.
    #[serde(default = "default_typing_interval")]
    pub typing_interval_secs: u64,

    /// Retry around turn dispatch.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_backend_url() -> String {
    "https://chat.openai.com/backend-api/conversation".to_string()
}

fn default_session_url() -> String {
    "https://chat.openai.com/api/auth/session".to_string()
}

fn default_model() -> String {
    "text-davinci-002-render".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36".to_string()
}

fn default_terminal_token() -> String {
    DEFAULT_TERMINAL_TOKEN.to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_refresh_timeout() -> u64 {
    15
}

fn default_edit_wait() -> u64 {
    1
}

fn default_typing_interval() -> u64 {
    10
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            session_url: default_session_url(),
            session_token: None,
            model: default_model(),
            user_agent: default_user_agent(),
            terminal_token: default_terminal_token(),
            connect_timeout_secs: default_connect_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
            edit_wait_secs: default_edit_wait(),
            typing_interval_secs: default_typing_interval(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RelayConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chat-relay").join("config.toml"))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::config(format!("Failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| RelayError::config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Load from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override fields from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(token) = var("OPENAI_SESSION") {
            self.session_token = Some(SecretString::from(token));
        }
        if let Some(url) = var("RELAY_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(url) = var("RELAY_SESSION_URL") {
            self.session_url = url;
        }
        if let Some(model) = var("RELAY_MODEL") {
            self.model = model;
        }
        if let Some(wait) = var("EDIT_WAIT_SECONDS") {
            self.edit_wait_secs = wait.trim().parse().map_err(|_| RelayError::InvalidConfig {
                field: "EDIT_WAIT_SECONDS".to_string(),
                message: format!("expected a whole number of seconds, got {wait:?}"),
            })?;
        }
        Ok(())
    }

    /// Check the configuration before use.
    pub fn validate(&self) -> Result<()> {
        let has_token = self
            .session_token
            .as_ref()
            .is_some_and(|token| !token.expose_secret().trim().is_empty());
        if !has_token {
            return Err(RelayError::InvalidConfig {
                field: "session_token".to_string(),
                message: "set OPENAI_SESSION or session_token in the config file".to_string(),
            });
        }

        for (field, value) in [
            ("backend_url", &self.backend_url),
            ("session_url", &self.session_url),
        ] {
            reqwest::Url::parse(value).map_err(|e| RelayError::InvalidConfig {
                field: field.to_string(),
                message: e.to_string(),
            })?;
        }

        if self.model.trim().is_empty() {
            return Err(RelayError::InvalidConfig {
                field: "model".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.typing_interval_secs == 0 {
            return Err(RelayError::InvalidConfig {
                field: "typing_interval_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn edit_wait(&self) -> Duration {
        Duration::from_secs(self.edit_wait_secs)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_secs(self.typing_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    fn with_token() -> RelayConfig {
        RelayConfig {
            session_token: Some(SecretString::from("sess".to_string())),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.edit_wait(), Duration::from_secs(1));
        assert_eq!(config.typing_interval(), Duration::from_secs(10));
        assert_eq!(config.terminal_token, "[DONE]");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.session_token.is_none());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model = "gpt-4"
edit_wait_secs = 3
session_token = "from-file"

[retry]
max_attempts = 5
delay = 200
"#
        )
        .unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.edit_wait(), Duration::from_secs(3));
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::from_millis(200)));
        assert_eq!(
            config.session_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("from-file".to_string())
        );
        // Untouched fields keep their defaults.
        assert_eq!(config.backend_url, default_backend_url());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RelayConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_SESSION", "env-token"),
            ("EDIT_WAIT_SECONDS", "4"),
            ("RELAY_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = RelayConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.edit_wait_secs, 4);
        assert_eq!(config.model, default_model());
        assert_eq!(
            config.session_token.unwrap().expose_secret(),
            "env-token"
        );
    }

    #[test]
    fn test_bad_edit_wait() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_overrides(|name| (name == "EDIT_WAIT_SECONDS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig { field, .. } if field == "EDIT_WAIT_SECONDS"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // SAFETY: serialized with the other env tests.
        unsafe {
            std::env::set_var("RELAY_BACKEND_URL", "http://localhost:9000/conversation");
        }
        let config = RelayConfig::from_env().unwrap();
        unsafe {
            std::env::remove_var("RELAY_BACKEND_URL");
        }

        assert_eq!(config.backend_url, "http://localhost:9000/conversation");
    }

    #[test]
    fn test_validate() {
        assert!(with_token().validate().is_ok());

        let err = RelayConfig::default().validate().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig { field, .. } if field == "session_token"));

        let config = RelayConfig {
            backend_url: "not a url".into(),
            ..with_token()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            typing_interval_secs: 0,
            ..with_token()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_session_token() {
        let rendered = format!("{:?}", with_token());
        assert!(!rendered.contains("\"sess\""));
    }
}
