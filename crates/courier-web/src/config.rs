use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_allow_origins")]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Where the transport keeps per-tenant pairing credentials.
    #[serde(default = "default_credential_dir")]
    pub credential_dir: PathBuf,
    #[serde(default)]
    pub session: SessionTuning,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SessionTuning {
    /// Delay before the supervisor's post-creation liveness re-check.
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,
    /// Grace period before a discovery scan after confirming the session.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl ServerConfig {
    /// Load from the config file if present, otherwise defaults.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            allow_origins: default_allow_origins(),
            event_capacity: default_event_capacity(),
            credential_dir: default_credential_dir(),
            session: SessionTuning::default(),
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            verify_delay_ms: default_verify_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

fn default_listen() -> SocketAddr {
    "127.0.0.1:8750".parse().expect("static listen address")
}

fn default_allow_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_event_capacity() -> usize {
    256
}

fn default_credential_dir() -> PathBuf {
    if let Ok(data_dir) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(data_dir).join("courier").join("credentials")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("courier")
            .join("credentials")
    } else {
        PathBuf::from("/tmp/courier/credentials")
    }
}

fn default_verify_delay_ms() -> u64 {
    1500
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn dirs_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("courier")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("courier")
    } else {
        PathBuf::from("/tmp/courier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listen, default_listen());
        assert_eq!(config.session.verify_delay_ms, 1500);
        assert_eq!(config.session.settle_delay_ms, 2000);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen = "0.0.0.0:9000"

            [session]
            settle_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.session.settle_delay_ms, 250);
        assert_eq!(config.session.verify_delay_ms, 1500);
    }
}
