use async_trait::async_trait;

use crate::error::Result;
use crate::models::{QueueEntry, TlTrack};

/// The calls the relay makes against the media daemon.
///
/// Implemented over the live Mopidy connection by the daemon binary and by
/// in-memory fakes in tests.  The connection is handed to each component
/// explicitly; nothing reaches for a global handle.
#[async_trait]
pub trait MediaDaemon: Send + Sync {
    /// The whole play queue, in order.
    async fn get_tracklist(&self) -> Result<Vec<QueueEntry>>;

    /// Index of the playing entry, `None` when the daemon does not know.
    async fn get_current_index(&self) -> Result<Option<usize>>;

    /// The playing track, `None` when nothing plays.
    async fn get_current_track(&self) -> Result<Option<TlTrack>>;

    /// Skip to the next track.
    async fn advance(&self) -> Result<()>;
}
