//! Slack Web API sender and Events API payloads.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::commands::Command;
use crate::dispatch::{AnnouncementTarget, ChatSender};
use crate::error::{RelayError, Result};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or further in the future) than this are replays.
pub const MAX_REQUEST_AGE_SECS: i64 = 5 * 60;

type HmacSha256 = Hmac<Sha256>;

// ── outbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// `chat.postMessage` client.  The token travels with each target.
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    api_base: String,
}

impl SlackClient {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatSender for SlackClient {
    async fn post_message(&self, target: &AnnouncementTarget, text: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&target.token)
            .json(&PostMessage {
                channel: &target.channel,
                text,
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let bytes = resp.bytes().await?;
        let body: ApiResponse = serde_json::from_slice(&bytes)?;
        if body.ok {
            Ok(())
        } else {
            Err(RelayError::Slack(
                body.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

// ── inbound ───────────────────────────────────────────────────────────────────

/// Check a request against the app's signing secret.
///
/// `signature` is the `X-Slack-Signature` header, `v0=` followed by the hex
/// HMAC-SHA256 of `v0:<timestamp>:<raw body>`.  `now` is unix seconds.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now: i64,
) -> Result<()> {
    let unauthorized = |msg: &str| RelayError::Unauthorized(msg.to_string());

    if secret.is_empty() {
        return Err(unauthorized("no signing secret configured"));
    }
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| unauthorized("missing or invalid request timestamp"))?;
    if now.abs_diff(ts) > MAX_REQUEST_AGE_SECS.unsigned_abs() {
        return Err(unauthorized("stale request timestamp"));
    }
    let expected = signature
        .strip_prefix("v0=")
        .and_then(|h| hex::decode(h).ok())
        .ok_or_else(|| unauthorized("missing or invalid signature"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| unauthorized("unusable signing secret"))?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    // constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| unauthorized("signature mismatch"))
}

/// Top-level body POSTed by the Events API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    UrlVerification { challenge: String },
    EventCallback { event: Event },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl Envelope {
    pub fn parse(body: Value) -> Result<Self> {
        serde_json::from_value(body).map_err(|e| RelayError::malformed(format!("slack event: {}", e)))
    }

    /// Parse a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::parse(value)
    }
}

impl Event {
    /// The command this event asks for, and the channel to answer in.
    ///
    /// Bot posts (our own announcements included) and edited/joined/etc.
    /// subtyped messages are ignored.
    pub fn command(&self) -> Option<(Command, &str)> {
        let channel = self.channel.as_deref()?;
        let text = self.text.as_deref()?;
        let cmd = match self.kind.as_str() {
            "message" if self.bot_id.is_none() && self.subtype.is_none() => {
                Command::from_message(text)
            }
            "app_mention" => Command::from_mention(text),
            _ => None,
        }?;
        Some((cmd, channel))
    }
}
