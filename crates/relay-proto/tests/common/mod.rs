#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_proto::daemon::MediaDaemon;
use relay_proto::dispatch::{AnnouncementTarget, AnnouncementTargets, ChatSender, Reply};
use relay_proto::enrich::{ContributorMetadata, MetadataSource};
use relay_proto::models::{QueueEntry, TlTrack, Track};
use relay_proto::stats::StatsSource;
use relay_proto::{RelayError, Result};
use serde_json::json;

pub const NOW_PLAYING: &str = "C-now-playing";
pub const QUEUE_END: &str = "C-queue-end";

pub fn targets() -> AnnouncementTargets {
    AnnouncementTargets {
        now_playing: AnnouncementTarget::new(NOW_PLAYING, "xoxb-test"),
        queue_end: AnnouncementTarget::new(QUEUE_END, "xoxb-test"),
    }
}

pub fn tl(tlid: u64, artist: &str, title: &str) -> TlTrack {
    let artists: Vec<&str> = if artist.is_empty() { vec![] } else { vec![artist] };
    TlTrack {
        tlid,
        track: Track::new(format!("local:track:{}", tlid), title, &artists),
    }
}

// ── media daemon ──────────────────────────────────────────────────────────────

/// In-memory daemon.  `down` makes every call fail like a dropped socket.
#[derive(Default)]
pub struct FakeDaemon {
    pub tracklist: Vec<TlTrack>,
    pub index: Option<usize>,
    pub current: Option<TlTrack>,
    pub down: bool,
    pub index_fails: bool,
    pub advances: AtomicUsize,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeDaemon {
    pub fn with_queue(tracklist: Vec<TlTrack>, index: Option<usize>) -> Self {
        let current = index.and_then(|i| tracklist.get(i).cloned());
        Self {
            tracklist,
            index,
            current,
            ..Default::default()
        }
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.down {
            return Err(RelayError::daemon("mopidy connection closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaDaemon for FakeDaemon {
    async fn get_tracklist(&self) -> Result<Vec<QueueEntry>> {
        self.record("get_tracklist")?;
        Ok(QueueEntry::from_tl_tracks(self.tracklist.clone()))
    }

    async fn get_current_index(&self) -> Result<Option<usize>> {
        self.record("get_current_index")?;
        if self.index_fails {
            return Err(RelayError::daemon("index timed out"));
        }
        Ok(self.index)
    }

    async fn get_current_track(&self) -> Result<Option<TlTrack>> {
        self.record("get_current_track")?;
        Ok(self.current.clone())
    }

    async fn advance(&self) -> Result<()> {
        self.record("advance")?;
        self.advances.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── chat ──────────────────────────────────────────────────────────────────────

/// Records every successful post; posts to `failing` channels error out.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: Vec<String>,
}

impl RecordingSender {
    pub fn failing_on(channel: &str) -> Self {
        Self {
            failing: vec![channel.to_string()],
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, t)| t)
            .collect()
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn post_message(&self, target: &AnnouncementTarget, text: &str) -> Result<()> {
        if self.failing.iter().any(|c| *c == target.channel) {
            return Err(RelayError::Slack("channel_not_found".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.channel.clone(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReply {
    pub said: Mutex<Vec<String>>,
}

impl RecordingReply {
    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reply for RecordingReply {
    async fn say(&self, text: &str) {
        self.said.lock().unwrap().push(text.to_string());
    }
}

/// Writes replies into a daemon's call log, so reply/daemon ordering can
/// be asserted from one sequence.
pub struct CallLogReply(pub Arc<FakeDaemon>);

#[async_trait]
impl Reply for CallLogReply {
    async fn say(&self, _text: &str) {
        self.0.calls.lock().unwrap().push("say");
    }
}

// ── side channels ─────────────────────────────────────────────────────────────

pub enum FakeMetadata {
    AddedBy(Vec<(u64, &'static str)>),
    Unreachable,
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn fetch(&self) -> Result<ContributorMetadata> {
        match self {
            FakeMetadata::AddedBy(entries) => {
                let mut map = serde_json::Map::new();
                for (tlid, who) in entries {
                    map.insert(format!("tlid_{}", tlid), json!({ "tlid": tlid, "added_by": who }));
                }
                let body = json!({ "result": { "queue_metadata": map } });
                Ok(ContributorMetadata::from_response(&body, "tlid_"))
            }
            FakeMetadata::Unreachable => Err(RelayError::Status {
                status: 503,
                url: "http://iris/get_queue_metadata".into(),
            }),
        }
    }
}

pub fn metadata(source: FakeMetadata) -> Option<Arc<dyn MetadataSource>> {
    Some(Arc::new(source))
}

pub enum FakeStats {
    Listeners(u64),
    Malformed,
}

#[async_trait]
impl StatsSource for FakeStats {
    async fn listeners(&self) -> Result<u64> {
        match self {
            FakeStats::Listeners(n) => Ok(*n),
            FakeStats::Malformed => Err(RelayError::malformed("no icestats.source.listeners")),
        }
    }
}
