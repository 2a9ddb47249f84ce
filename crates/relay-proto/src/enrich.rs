//! Contributor attribution from the Iris queue-metadata side channel.
//!
//! Iris keeps, per tracklist entry, who queued it:
//!
//! ```text
//! { "result": { "queue_metadata": {
//!     "tlid_12775": { "tlid": 12775, "added_by": "beaufour", "added_from": "iris:search:..." }
//! } } }
//! ```
//!
//! The map is fetched fresh for every event or command and never cached.
//! A missing entry, or a missing `queue_metadata` section altogether, is a
//! normal outcome and simply means "no attribution".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};

/// Default key prefix Iris puts in front of each tlid.
pub const DEFAULT_KEY_PREFIX: &str = "tlid_";

// ── ContributorMetadata ───────────────────────────────────────────────────────

/// Snapshot of position identifier → "added by" attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContributorMetadata {
    key_prefix: String,
    added_by: HashMap<String, String>,
}

impl ContributorMetadata {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extract attributions from an Iris response body.
    ///
    /// Returns an empty map when `result.queue_metadata` is absent; entries
    /// without a string `added_by` are skipped.
    pub fn from_response(body: &Value, key_prefix: &str) -> Self {
        let mut added_by = HashMap::new();
        if let Some(map) = body.pointer("/result/queue_metadata").and_then(Value::as_object) {
            for (key, entry) in map {
                if let Some(who) = entry.get("added_by").and_then(Value::as_str) {
                    added_by.insert(key.clone(), who.to_string());
                }
            }
        }
        Self {
            key_prefix: key_prefix.to_string(),
            added_by,
        }
    }

    /// Attribution for the entry with this tlid, if any and non-empty.
    pub fn attribution(&self, tlid: u64) -> Option<&str> {
        let key = format!("{}{}", self.key_prefix, tlid);
        self.added_by
            .get(&key)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.added_by.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added_by.is_empty()
    }
}

// ── MetadataSource ────────────────────────────────────────────────────────────

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> Result<ContributorMetadata>;
}

/// HTTP client for the Iris `get_queue_metadata` endpoint.
pub struct IrisMetadata {
    client: Client,
    url: String,
    key_prefix: String,
}

impl IrisMetadata {
    pub fn new(client: Client, url: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl MetadataSource for IrisMetadata {
    async fn fetch(&self) -> Result<ContributorMetadata> {
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
        let metadata = ContributorMetadata::from_response(&body, &self.key_prefix);
        debug!("[iris] {} queue metadata entries", metadata.len());
        Ok(metadata)
    }
}

/// Fetch attributions, turning any failure into an empty snapshot.
///
/// `None` means enrichment is not configured.
pub async fn fetch_best_effort(source: Option<&Arc<dyn MetadataSource>>) -> ContributorMetadata {
    let Some(source) = source else {
        return ContributorMetadata::empty();
    };
    match source.fetch().await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("[iris] queue metadata {} ({}), announcing without attribution", e.class(), e);
            ContributorMetadata::empty()
        }
    }
}
