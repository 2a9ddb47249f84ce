//! Chat commands: `queue`, `skip`, `current`, `listeners`.
//!
//! Each handler answers exactly once through the [`Reply`] it is given, even
//! when every dependency is down.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{info, warn};

use crate::daemon::MediaDaemon;
use crate::dispatch::Reply;
use crate::enrich::{fetch_best_effort, MetadataSource};
use crate::error::{RelayError, Result};
use crate::format::{format_queue, format_track};
use crate::queue::resolve_window;
use crate::stats::StatsSource;

pub const QUEUE_EMPTY: &str = "Queue is empty";
pub const QUEUE_FAILED: &str = "Could not get queue :(";
pub const SKIPPING: &str = "Skipping current song";
pub const CURRENT_FAILED: &str = "Could not get current track :(";
pub const LISTENERS_FAILED: &str = "Could not get listeners :(";

// ── Command ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Queue,
    Skip,
    Current,
    Listeners,
}

impl Command {
    /// Match order when a message contains several keywords.
    pub const ALL: [Command; 4] = [
        Command::Queue,
        Command::Skip,
        Command::Current,
        Command::Listeners,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Queue => "queue",
            Command::Skip => "skip",
            Command::Current => "current",
            Command::Listeners => "listeners",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.keyword() == word)
    }

    /// Plain channel message: the first keyword contained anywhere in it.
    pub fn from_message(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| text.contains(c.keyword()))
    }

    /// Bot mention: `<@U123> queue ...`.
    pub fn from_mention(text: &str) -> Option<Self> {
        static MENTION: OnceLock<Option<Regex>> = OnceLock::new();
        let re = MENTION
            .get_or_init(|| Regex::new(r"^<.+> (queue|skip|current|listeners)").ok())
            .as_ref()?;
        let caps = re.captures(text)?;
        Self::from_keyword(caps.get(1)?.as_str())
    }
}

// ── CommandController ─────────────────────────────────────────────────────────

pub struct CommandController {
    daemon: Arc<dyn MediaDaemon>,
    metadata: Option<Arc<dyn MetadataSource>>,
    stats: Option<Arc<dyn StatsSource>>,
}

impl CommandController {
    pub fn new(
        daemon: Arc<dyn MediaDaemon>,
        metadata: Option<Arc<dyn MetadataSource>>,
        stats: Option<Arc<dyn StatsSource>>,
    ) -> Self {
        Self {
            daemon,
            metadata,
            stats,
        }
    }

    pub async fn handle(&self, cmd: Command, reply: &dyn Reply) {
        info!(">> {}", cmd.keyword());
        match cmd {
            Command::Queue => self.queue(reply).await,
            Command::Skip => self.skip(reply).await,
            Command::Current => self.current(reply).await,
            Command::Listeners => self.listeners(reply).await,
        }
    }

    pub async fn queue(&self, reply: &dyn Reply) {
        let text = match self.queue_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not get queue ({}): {}", e.class(), e);
                QUEUE_FAILED.to_string()
            }
        };
        reply.say(&text).await;
    }

    async fn queue_text(&self) -> Result<String> {
        let window = resolve_window(self.daemon.as_ref()).await?;
        if window.is_empty() {
            info!("Empty queue");
            return Ok(QUEUE_EMPTY.to_string());
        }
        let metadata = fetch_best_effort(self.metadata.as_ref()).await;
        Ok(format!("Here is the queue:\n{}", format_queue(&window, &metadata)))
    }

    /// Replies before the daemon is asked to advance; the reply does not
    /// depend on the skip succeeding.
    pub async fn skip(&self, reply: &dyn Reply) {
        reply.say(SKIPPING).await;
        if let Err(e) = self.daemon.advance().await {
            warn!("Skip failed ({}): {}", e.class(), e);
        }
    }

    pub async fn current(&self, reply: &dyn Reply) {
        let text = match self.current_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not get current track ({}): {}", e.class(), e);
                CURRENT_FAILED.to_string()
            }
        };
        reply.say(&text).await;
    }

    async fn current_text(&self) -> Result<String> {
        let Some(tl) = self.daemon.get_current_track().await? else {
            return Ok("Currently playing: Nothing".to_string());
        };
        let metadata = fetch_best_effort(self.metadata.as_ref()).await;
        let line = format_track(&tl.track, metadata.attribution(tl.tlid));
        info!("Current track: {}", line);
        Ok(format!("Currently playing: {}", line))
    }

    pub async fn listeners(&self, reply: &dyn Reply) {
        let text = match self.listener_count().await {
            Ok(n) => format!("There are currently {} listener(s)", n),
            Err(e) => {
                warn!("Could not get listeners ({}): {}", e.class(), e);
                LISTENERS_FAILED.to_string()
            }
        };
        reply.say(&text).await;
    }

    async fn listener_count(&self) -> Result<u64> {
        let stats = self
            .stats
            .as_ref()
            .ok_or_else(|| RelayError::Config("no stats endpoint configured".into()))?;
        stats.listeners().await
    }
}
