use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;
use crate::dispatch::{AnnouncementTarget, AnnouncementTargets};
use crate::enrich::DEFAULT_KEY_PREFIX;
use crate::error::{RelayError, Result};
use crate::slack::DEFAULT_API_BASE;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mopidy: MopidyConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MopidyConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// App signing secret; inbound events must be signed with it.
    #[serde(default)]
    pub signing_secret: String,
    /// Channel receiving "Playing: ..." announcements.
    #[serde(default)]
    pub now_playing_channel: String,
    /// Channel receiving the queue-exhausted notice.  Falls back to
    /// `now_playing_channel` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_end_channel: Option<String>,
}

/// Slack Events API receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Iris queue metadata.  No URL, no attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_metadata_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Icecast server root.  No URL, `listeners` always apologises.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for MopidyConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            signing_secret: String::new(),
            now_playing_channel: String::new(),
            queue_end_channel: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            queue_metadata_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_ws_url() -> String {
    "ws://localhost:6680/mopidy/ws".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// Treat blank environment values as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Read the config file (writing defaults if absent), then apply
    /// `SLACK_BOT_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| RelayError::Config(format!("{}: {}", config_path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RelayError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RelayError::Config(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))?;
        std::fs::write(&config_path, content).map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(v) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = v;
        }
        if let Some(v) = get("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = v;
        }
        if let Some(v) = get("SLACK_BOT_CHANNEL") {
            self.slack.now_playing_channel = v;
        }
        if let Some(v) = get("SLACK_BOT_QUEUE_CHANNEL") {
            self.slack.queue_end_channel = Some(v);
        }
        if let Some(v) = get("SLACK_BOT_WS_URL") {
            self.mopidy.ws_url = v;
        }
        if let Some(port) = get("SLACK_BOT_PORT").and_then(|v| v.parse().ok()) {
            self.http.port = port;
        }
        if let Some(v) = get("SLACK_BOT_METADATA_URL") {
            self.metadata.queue_metadata_url = Some(v);
        }
        if let Some(v) = get("SLACK_BOT_STATS_URL") {
            self.stats.base_url = Some(v);
        }
    }

    /// Secret for verifying inbound Slack events.  Required whenever the
    /// HTTP receiver is enabled.
    pub fn signing_secret(&self) -> Result<&str> {
        let secret = self.slack.signing_secret.trim();
        if secret.is_empty() {
            return Err(RelayError::Config("slack.signing_secret is not set".into()));
        }
        Ok(secret)
    }

    /// Announcement destinations, validated.
    pub fn targets(&self) -> Result<AnnouncementTargets> {
        let token = self.slack.bot_token.trim();
        if token.is_empty() {
            return Err(RelayError::Config("slack.bot_token is not set".into()));
        }
        let now_playing = self.slack.now_playing_channel.trim();
        if now_playing.is_empty() {
            return Err(RelayError::Config("slack.now_playing_channel is not set".into()));
        }
        let queue_end = self
            .slack
            .queue_end_channel
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(now_playing);
        Ok(AnnouncementTargets {
            now_playing: AnnouncementTarget::new(now_playing, token),
            queue_end: AnnouncementTarget::new(queue_end, token),
        })
    }
}
