//! Listener count from an Icecast `status-json.xsl` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{RelayError, Result};

#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn listeners(&self) -> Result<u64>;
}

/// Pull `icestats.source.listeners` out of an Icecast status document.
///
/// With a single mount `source` is an object; with several it is an array
/// and the counts of every mount reporting one are summed.
pub fn parse_listeners(body: &Value) -> Option<u64> {
    match body.pointer("/icestats/source")? {
        Value::Object(src) => src.get("listeners")?.as_u64(),
        Value::Array(mounts) => {
            let counts: Vec<u64> = mounts
                .iter()
                .filter_map(|m| m.get("listeners").and_then(Value::as_u64))
                .collect();
            if counts.is_empty() {
                None
            } else {
                Some(counts.iter().sum())
            }
        }
        _ => None,
    }
}

pub struct IcecastStats {
    client: Client,
    url: String,
}

impl IcecastStats {
    /// `base_url` is the Icecast server root, e.g. `http://radio.example:8000`.
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/status-json.xsl", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl StatsSource for IcecastStats {
    async fn listeners(&self) -> Result<u64> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        let bytes = resp.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        let n = parse_listeners(&body)
            .ok_or_else(|| RelayError::malformed("no icestats.source.listeners in status"))?;
        debug!("[icecast] {} listeners", n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_mount() {
        let body = json!({ "icestats": { "source": { "listeners": 7 } } });
        assert_eq!(parse_listeners(&body), Some(7));
    }

    #[test]
    fn test_missing_structure() {
        assert_eq!(parse_listeners(&json!({ "icestats": {} })), None);
        assert_eq!(parse_listeners(&json!({})), None);
        assert_eq!(parse_listeners(&json!({ "icestats": { "source": { "listeners": "x" } } })), None);
    }

    #[test]
    fn test_multiple_mounts_summed() {
        let body = json!({ "icestats": { "source": [
            { "listenurl": "http://x/low", "listeners": 2 },
            { "listenurl": "http://x/high", "listeners": 5 },
            { "listenurl": "http://x/idle" }
        ] } });
        assert_eq!(parse_listeners(&body), Some(7));
        assert_eq!(parse_listeners(&json!({ "icestats": { "source": [] } })), None);
    }

    #[test]
    fn test_status_url() {
        let stats = IcecastStats::new(Client::new(), "http://radio:8000/");
        assert_eq!(stats.url, "http://radio:8000/status-json.xsl");
    }
}
