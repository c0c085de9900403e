use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// SSH host that serves the alert log.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub hostname: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    /// Login password, or the key passphrase when `private_key` is set
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    #[serde(default = "default_remote_log_path")]
    pub log_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
    #[serde(default = "default_freshness_threshold")]
    pub freshness_threshold_secs: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMethod {
    #[default]
    Desktop,
    Log,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub method: NotifyMethod,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_remote_log_path() -> String {
    "/home/pi/adsb_upload/adsb_repeat/alerts.txt".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_interval() -> u64 {
    5
}

fn default_backoff() -> u64 {
    20
}

fn default_freshness_threshold() -> f64 {
    10.0
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            backoff_secs: default_backoff(),
            freshness_threshold_secs: default_freshness_threshold(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Shell command that prints the alert log
    pub fn log_command(&self) -> String {
        format!("cat '{}'", self.log_path.replace('\'', r"'\''"))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [remote]
            hostname = "adsb-pi.local"
            username = "pi"
            password = "raspberry"
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.port, 22);
        assert_eq!(config.remote.timeout(), Duration::from_secs(15));
        assert!(config.remote.private_key.is_none());
        assert_eq!(config.poll.interval_secs, 5);
        assert_eq!(config.poll.backoff_secs, 20);
        assert_eq!(config.poll.freshness_threshold_secs, 10.0);
        assert_eq!(config.notify.method, NotifyMethod::Desktop);
        assert_eq!(
            config.remote.log_command(),
            "cat '/home/pi/adsb_upload/adsb_repeat/alerts.txt'"
        );
    }

    #[test]
    fn test_key_auth_and_log_notifier() {
        let config = Config::parse(
            r#"
            [remote]
            hostname = "10.0.0.7"
            port = 2222
            username = "pi"
            private_key = "/home/me/.ssh/id_ed25519"
            log_path = "/tmp/it's here/alerts.txt"

            [poll]
            freshness_threshold_secs = 2.5

            [notify]
            method = "log"
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.port, 2222);
        assert_eq!(config.remote.private_key, Some(PathBuf::from("/home/me/.ssh/id_ed25519")));
        assert_eq!(config.poll.freshness_threshold_secs, 2.5);
        assert_eq!(config.notify.method, NotifyMethod::Log);
        assert_eq!(config.remote.log_command(), r"cat '/tmp/it'\''s here/alerts.txt'");
    }

    #[test]
    fn test_remote_section_is_required() {
        assert!(Config::parse("[poll]\ninterval_secs = 1\n").is_err());
    }
}
