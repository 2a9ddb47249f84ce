/// RelayCore: single-owner event loop for the Mopidy connection.
///
/// Every input (daemon notices, reconnect timers, shutdown) arrives as a
/// `RelayEvent` on one channel.  RelayCore owns the driver and decides when
/// to (re)connect; the live handle is shared with the handlers through
/// `MopidyClient`.
///
/// Playback events are handed off to their own task so a slow Slack or Iris
/// call never holds up the loop, and two events never wait on each other.
use std::sync::Arc;

use chrono::{DateTime, Local};
use relay_proto::handler::TrackEventHandler;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mopidy::{MopidyClient, MopidyDriver, MopidyEvent, MopidyNotice};

const RECONNECT_DELAY_SECS: u64 = 5;

// ── RelayEvent ────────────────────────────────────────────────────────────────

/// All inputs into the RelayCore loop.
#[derive(Debug)]
pub enum RelayEvent {
    /// Forwarded from the Mopidy reader task.
    Mopidy(MopidyNotice),
    /// Reconnect timer fired.
    Reconnect,
    /// Shutdown requested (ctrl-c).
    Shutdown,
}

// ── RelayCore ─────────────────────────────────────────────────────────────────

pub struct RelayCore {
    driver: MopidyDriver,
    mopidy: MopidyClient,
    handler: Arc<TrackEventHandler>,
    /// Channel to feed timers and forwarded notices back into our own loop.
    event_tx: mpsc::Sender<RelayEvent>,
    connected_since: Option<DateTime<Local>>,
    reconnect_scheduled: bool,
}

impl RelayCore {
    pub fn new(
        driver: MopidyDriver,
        mopidy: MopidyClient,
        handler: Arc<TrackEventHandler>,
        event_tx: mpsc::Sender<RelayEvent>,
    ) -> Self {
        Self {
            driver,
            mopidy,
            handler,
            event_tx,
            connected_since: None,
            reconnect_scheduled: false,
        }
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<RelayEvent>) -> anyhow::Result<()> {
        info!("RelayCore: starting event loop");
        self.connect().await;

        loop {
            match event_rx.recv().await {
                None => {
                    info!("RelayCore: event channel closed, shutting down");
                    break;
                }

                Some(RelayEvent::Shutdown) => {
                    info!("RelayCore: shutdown requested");
                    break;
                }

                Some(RelayEvent::Mopidy(MopidyNotice::Event(evt))) => {
                    self.handle_mopidy_event(evt);
                }

                Some(RelayEvent::Mopidy(MopidyNotice::Disconnected)) => {
                    let since = self
                        .connected_since
                        .take()
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "?".to_string());
                    warn!("RelayCore: lost Mopidy connection (up since {})", since);
                    self.mopidy.detach().await;
                    self.schedule_reconnect();
                }

                Some(RelayEvent::Reconnect) => {
                    self.reconnect_scheduled = false;
                    if !self.mopidy.is_connected().await {
                        self.connect().await;
                    }
                }
            }
        }

        self.mopidy.detach().await;
        Ok(())
    }

    // ── mopidy events ─────────────────────────────────────────────────────────

    fn handle_mopidy_event(&self, evt: MopidyEvent) {
        debug!("mopidy event: {}", evt.raw);

        let Some(started) = evt.as_playback_started() else {
            return;
        };
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            let out = handler.on_playback_started(&started).await;
            debug!("RelayCore: tlid={} announced: {:?}", started.tlid(), out);
        });
    }

    // ── connection ────────────────────────────────────────────────────────────

    async fn connect(&mut self) {
        // One forwarder per connection, mapping driver notices into our loop.
        let (notice_tx, mut notice_rx) = mpsc::channel::<MopidyNotice>(64);
        let core_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(notice) = notice_rx.recv().await {
                if core_tx.send(RelayEvent::Mopidy(notice)).await.is_err() {
                    break;
                }
            }
        });

        match self.driver.connect(notice_tx).await {
            Ok(handle) => {
                self.mopidy.attach(handle).await;
                self.connected_since = Some(Local::now());
                info!("Connected to Mopidy");
            }
            Err(e) => {
                warn!(
                    "RelayCore: could not connect to {}: {} (retrying in {}s)",
                    self.driver.ws_url(),
                    e,
                    RECONNECT_DELAY_SECS
                );
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_scheduled {
            return;
        }
        self.reconnect_scheduled = true;
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            let _ = tx.send(RelayEvent::Reconnect).await;
        });
    }
}
