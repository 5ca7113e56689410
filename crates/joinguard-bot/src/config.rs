//! JoinGuard configuration
//!
//! Layered: built-in defaults, then an optional `joinguard.toml`, then
//! `JOINGUARD_*` environment variables (`__` separates nested keys, e.g.
//! `JOINGUARD_GATE__CHALLENGE_WINDOW_SECS=120`). A `.env` file is read
//! first if present.

use joinguard_common::ConfigError;
use joinguard_gate::{GateConfig, MessageTemplates};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "joinguard.toml";

/// Bot configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot API credential
    pub bot_token: String,
    /// User allowed to run operator commands
    pub owner_id: Option<i64>,
    /// Bot API base URL
    pub api_base_url: String,
    /// Long-poll timeout for getUpdates
    pub poll_timeout_secs: u64,
    /// Directory for pending.json and groups.json
    pub state_dir: PathBuf,
    /// Verification gate settings
    pub gate: GateConfig,
    /// Message templates
    pub messages: MessageTemplates,
    /// Status HTTP endpoint
    pub status: StatusSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            owner_id: None,
            api_base_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            state_dir: PathBuf::from("./data"),
            gate: GateConfig::default(),
            messages: MessageTemplates::default(),
            status: StatusSettings::default(),
        }
    }
}

// Keeps the token out of logs
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &if self.bot_token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("owner_id", &self.owner_id)
            .field("api_base_url", &self.api_base_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("state_dir", &self.state_dir)
            .field("gate", &self.gate)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl BotConfig {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let path = std::env::var("JOINGUARD_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load with an explicit config file path (the file may be absent)
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("JOINGUARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "config",
                reason: e.to_string(),
            })?;

        let mut cfg: BotConfig = settings.try_deserialize().map_err(|e| ConfigError::Invalid {
            key: "config",
            reason: e.to_string(),
        })?;

        // plain BOT_TOKEN, as older deployments set it
        if cfg.bot_token.is_empty() {
            if let Ok(token) = std::env::var("BOT_TOKEN") {
                cfg.bot_token = token;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("bot_token"));
        }
        if self.gate.challenge_window_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "gate.challenge_window_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.poll_timeout_secs == 0 || self.poll_timeout_secs > 50 {
            return Err(ConfigError::Invalid {
                key: "poll_timeout_secs",
                reason: "must be between 1 and 50".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "api_base_url",
                reason: format!("not an http(s) URL: {}", self.api_base_url),
            });
        }
        Ok(())
    }

    pub fn pending_path(&self) -> PathBuf {
        self.state_dir.join("pending.json")
    }

    pub fn groups_path(&self) -> PathBuf {
        self.state_dir.join("groups.json")
    }
}

/// Status endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8085,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joinguard_common::RemovalPolicy;

    fn valid() -> BotConfig {
        BotConfig {
            bot_token: "123:abc".into(),
            ..BotConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.gate.challenge_window_secs, 300);
        assert_eq!(cfg.gate.removal_policy, RemovalPolicy::Kick);
        assert_eq!(cfg.pending_path(), PathBuf::from("./data/pending.json"));
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(matches!(BotConfig::default().validate(), Err(ConfigError::Missing("bot_token"))));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut cfg = valid();
        cfg.gate.challenge_window_secs = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "gate.challenge_window_secs", .. })
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let printed = format!("{:?}", valid());
        assert!(!printed.contains("123:abc"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("joinguard.toml");
        std::fs::write(
            &path,
            r#"
bot_token = "42:file-token"
owner_id = 1001

[gate]
challenge_window_secs = 120
removal_policy = "ban"

[messages]
welcome = "Hello {name}"
"#,
        )
        .unwrap();

        let cfg = BotConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.bot_token, "42:file-token");
        assert_eq!(cfg.owner_id, Some(1001));
        assert_eq!(cfg.gate.challenge_window_secs, 120);
        assert_eq!(cfg.gate.removal_policy, RemovalPolicy::Ban);
        assert_eq!(cfg.gate.replay_guard_secs, 600);
        assert_eq!(cfg.messages.welcome, "Hello {name}");
        assert_eq!(cfg.messages.button_label, "I am human");
        assert_eq!(cfg.status.port, 8085);
    }
}
