use crate::daemon::MediaDaemon;
use crate::error::Result;
use crate::models::QueueEntry;

/// How many upcoming entries a queue listing shows.
pub const QUEUE_WINDOW_LEN: usize = 5;

/// The entries immediately following the current playback position.
///
/// Never contains the current entry and never more than
/// [`QUEUE_WINDOW_LEN`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueWindow {
    entries: Vec<QueueEntry>,
}

impl QueueWindow {
    /// Slice the tracklist starting right after `current_index`.
    ///
    /// An unknown index means nothing has played yet, so the window starts
    /// at position 0.  The daemon's index is trusted to point at the entry
    /// that is playing right now; if it lags by one the window is off by one.
    pub fn resolve(mut tracklist: Vec<QueueEntry>, current_index: Option<usize>) -> Self {
        let start = current_index.map_or(0, |i| i.saturating_add(1));
        if start >= tracklist.len() {
            return Self::default();
        }
        let end = tracklist.len().min(start + QUEUE_WINDOW_LEN);
        tracklist.truncate(end);
        let entries = tracklist.split_off(start);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }
}

/// Fetch the tracklist, then the current index, and slice the window.
///
/// The two reads are sequential, not transactional; the index may move in
/// between and the result is best effort.
pub async fn resolve_window(daemon: &dyn MediaDaemon) -> Result<QueueWindow> {
    let tracklist = daemon.get_tracklist().await?;
    if tracklist.is_empty() {
        return Ok(QueueWindow::default());
    }
    let index = daemon.get_current_index().await?;
    Ok(QueueWindow::resolve(tracklist, index))
}
