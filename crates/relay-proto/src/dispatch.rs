//! Outbound dispatch with isolated failures.
//!
//! A send can fail; it must never take a sibling send down with it.  Every
//! call goes through [`dispatch`], which logs and reports instead of
//! returning an error.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::Result;

/// A channel plus the credential allowed to post there.
#[derive(Clone, PartialEq, Eq)]
pub struct AnnouncementTarget {
    pub channel: String,
    pub token: String,
}

impl AnnouncementTarget {
    pub fn new(channel: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for AnnouncementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnouncementTarget")
            .field("channel", &self.channel)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Where playback announcements go.  Both may name the same channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementTargets {
    pub now_playing: AnnouncementTarget,
    pub queue_end: AnnouncementTarget,
}

#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn post_message(&self, target: &AnnouncementTarget, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
}

pub async fn dispatch(
    sender: &dyn ChatSender,
    target: &AnnouncementTarget,
    text: &str,
) -> DispatchOutcome {
    match sender.post_message(target, text).await {
        Ok(()) => {
            debug!("sent to {}: {}", target.channel, text);
            DispatchOutcome::Sent
        }
        Err(e) => {
            error!("got error sending message to {}: {}", target.channel, e);
            DispatchOutcome::Failed
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// Capability handed to command handlers to answer the requester.
///
/// Infallible from the caller's point of view: a lost reply is logged by
/// the implementation.
#[async_trait]
pub trait Reply: Send + Sync {
    async fn say(&self, text: &str);
}

/// Replies into the channel a command came from.
pub struct ChannelReply {
    sender: Arc<dyn ChatSender>,
    target: AnnouncementTarget,
}

impl ChannelReply {
    pub fn new(sender: Arc<dyn ChatSender>, target: AnnouncementTarget) -> Self {
        Self { sender, target }
    }
}

#[async_trait]
impl Reply for ChannelReply {
    async fn say(&self, text: &str) {
        dispatch(self.sender.as_ref(), &self.target, text).await;
    }
}
