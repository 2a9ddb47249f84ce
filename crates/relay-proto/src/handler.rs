/// Track event pipeline: one `track_playback_started` notification in, zero
/// to two Slack messages out.
///
/// ```text
///   PlaybackStarted
///         │
///         ├── enrich      ← Iris queue metadata (failure → no attribution)
///         ├── format      ← "Playing: <artist> - <title> [Added by: ..]"
///         ├── dispatch    → now-playing channel   (failure logged)
///         │
///         └── queue check ← tracklist, then index (failure → stop)
///                └── window empty → queue-end channel (failure logged)
/// ```
///
/// The primary announcement and the queue check have separate failure
/// domains: neither outcome affects whether the other runs.
use std::sync::Arc;

use tracing::{info, warn};

use crate::daemon::MediaDaemon;
use crate::dispatch::{dispatch, AnnouncementTargets, ChatSender, DispatchOutcome};
use crate::enrich::{fetch_best_effort, MetadataSource};
use crate::format::format_track;
use crate::models::PlaybackStarted;
use crate::queue::resolve_window;

pub const QUEUE_END_NOTICE: &str = "No more tracks in queue after the current song";

/// What happened to the queue-exhaustion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCheck {
    /// Tracks follow; no notice sent.
    Upcoming(usize),
    /// Nothing follows; the notice was dispatched (or failed to be).
    Exhausted(DispatchOutcome),
    /// The queue could not be read.
    Unresolved,
}

/// Result of handling one playback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcements {
    pub now_playing: DispatchOutcome,
    pub queue: QueueCheck,
}

pub struct TrackEventHandler {
    daemon: Arc<dyn MediaDaemon>,
    metadata: Option<Arc<dyn MetadataSource>>,
    sender: Arc<dyn ChatSender>,
    targets: AnnouncementTargets,
}

impl TrackEventHandler {
    pub fn new(
        daemon: Arc<dyn MediaDaemon>,
        metadata: Option<Arc<dyn MetadataSource>>,
        sender: Arc<dyn ChatSender>,
        targets: AnnouncementTargets,
    ) -> Self {
        Self {
            daemon,
            metadata,
            sender,
            targets,
        }
    }

    pub async fn on_playback_started(&self, event: &PlaybackStarted) -> Announcements {
        let now_playing = self.announce_now_playing(event).await;
        let queue = self.check_queue_end().await;
        Announcements { now_playing, queue }
    }

    async fn announce_now_playing(&self, event: &PlaybackStarted) -> DispatchOutcome {
        let metadata = fetch_best_effort(self.metadata.as_ref()).await;
        let msg = format!(
            "Playing: {}",
            format_track(event.track(), metadata.attribution(event.tlid()))
        );
        info!("{}", msg);
        dispatch(self.sender.as_ref(), &self.targets.now_playing, &msg).await
    }

    async fn check_queue_end(&self) -> QueueCheck {
        let window = match resolve_window(self.daemon.as_ref()).await {
            Ok(w) => w,
            Err(e) => {
                warn!("Could not resolve queue after playback start, daemon {}: {}", e.class(), e);
                return QueueCheck::Unresolved;
            }
        };
        if !window.is_empty() {
            return QueueCheck::Upcoming(window.len());
        }
        info!("Queue exhausted, notifying {}", self.targets.queue_end.channel);
        let outcome = dispatch(self.sender.as_ref(), &self.targets.queue_end, QUEUE_END_NOTICE).await;
        QueueCheck::Exhausted(outcome)
    }
}

