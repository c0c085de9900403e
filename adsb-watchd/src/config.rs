use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use crate::lookup::reference::IndexedBy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    #[serde(default = "default_watchlist_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_reference_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub indexed_by: IndexedBy,
    /// Start with an empty database instead of loading `db_path`
    #[serde(default)]
    pub skip_load: bool,
    /// argv run by `db_update` before the reload
    #[serde(default = "default_update_command")]
    pub update_command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

/// Pub/sub transport, selected by `mode`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TransportConfig {
    #[default]
    Disabled,
    Mqtt(MqttConfig),
    Aws(AwsConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

/// MQTT over mutual TLS, the AWS IoT style endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub endpoint: String,
    #[serde(default = "default_aws_port")]
    pub port: u16,
    pub client_id: Option<String>,
    pub root_ca: PathBuf,
    pub cert: PathBuf,
    pub private_key: PathBuf,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Status API is only served when a listen address is set
    pub listen: Option<String>,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("/run/dump1090-mutability/aircraft.json")
}

fn default_poll_interval() -> u64 {
    5
}

fn default_watchlist_path() -> PathBuf {
    PathBuf::from("watchlist.jsonl")
}

fn default_reference_path() -> PathBuf {
    PathBuf::from("aircrafts.json")
}

fn default_update_command() -> Vec<String> {
    vec!["sh".to_string(), "./update_db.sh".to_string()]
}

fn default_log_path() -> PathBuf {
    PathBuf::from("alerts.txt")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("log.txt")
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_aws_port() -> u16 {
    8883
}

fn default_keep_alive() -> u64 {
    60
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            path: default_watchlist_path(),
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_reference_path(),
            indexed_by: IndexedBy::default(),
            skip_load: false,
            update_command: default_update_command(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            history_path: default_history_path(),
        }
    }
}

impl TransportConfig {
    /// Configured client id, falling back to the host name.
    pub fn client_id(&self) -> Result<String> {
        let configured = match self {
            TransportConfig::Disabled => None,
            TransportConfig::Mqtt(mqtt) => mqtt.client_id.clone(),
            TransportConfig::Aws(aws) => aws.client_id.clone(),
        };
        match configured {
            Some(id) => Ok(id),
            None => Ok(hostname::get()
                .context("Failed to get system hostname")?
                .to_string_lossy()
                .to_string()),
        }
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
