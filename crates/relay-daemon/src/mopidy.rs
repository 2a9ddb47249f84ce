/// Mopidy JSON-RPC driver over WebSocket, with separated reader/writer tasks.
///
/// Architecture:
///
/// ```text
///   MopidyDriver::connect()
///         │
///         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON text frames from socket
///                                ├── response (has id)   → matched oneshot::Sender
///                                ├── event (has "event") → notice_tx channel
///                                └── close / error       → Disconnected, fail pending
/// ```
///
/// Public API:
///   - `MopidyHandle`: cheaply cloneable.  `call(method, params)` returns the
///     JSON-RPC `result`.
///   - `MopidyClient`: swappable handle implementing `MediaDaemon`.
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_proto::daemon::MediaDaemon;
use relay_proto::models::{PlaybackStarted, QueueEntry, TlTrack};
use relay_proto::{RelayError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const CALL_TIMEOUT_SECS: u64 = 10;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String,
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// A Mopidy event that arrived unsolicited (no id).
#[derive(Debug, Clone)]
pub struct MopidyEvent {
    pub raw: Value,
}

impl MopidyEvent {
    /// e.g. "track_playback_started", "tracklist_changed", "volume_changed".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    pub fn as_playback_started(&self) -> Option<PlaybackStarted> {
        if self.event_name()? != "track_playback_started" {
            return None;
        }
        match serde_json::from_value(self.raw.clone()) {
            Ok(evt) => Some(evt),
            Err(e) => {
                warn!("mopidy: unreadable track_playback_started: {}", e);
                None
            }
        }
    }
}

/// What the reader task reports besides call responses.
#[derive(Debug)]
pub enum MopidyNotice {
    Event(MopidyEvent),
    Disconnected,
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MopidyHandle {
    tx: mpsc::Sender<PendingRequest>,
    /// Shared with the I/O tasks; a timed-out call removes its own entry.
    pending: PendingMap,
    call_timeout: Duration,
}

impl MopidyHandle {
    pub async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "jsonrpc": "2.0", "id": req_id, "method": method, "params": params });
        let payload = serde_json::to_string(&msg)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mopidy writer task gone"))?;

        match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Ok(reply) => {
                reply.map_err(|_| anyhow::anyhow!("mopidy reply channel dropped req={}", req_id))?
            }
            Err(_) => {
                self.pending.lock().await.remove(&req_id);
                Err(anyhow::anyhow!("mopidy timeout for {} req={}", method, req_id))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

pub struct MopidyDriver {
    ws_url: String,
}

impl MopidyDriver {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub async fn connect(
        &self,
        notice_tx: mpsc::Sender<MopidyNotice>,
    ) -> anyhow::Result<MopidyHandle> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await?;
        info!("mopidy: connected to {}", self.ws_url);
        Ok(Self::start_io_tasks(stream, notice_tx))
    }

    fn start_io_tasks(stream: WsStream, notice_tx: mpsc::Sender<MopidyNotice>) -> MopidyHandle {
        let (sink, source) = stream.split();

        // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        tokio::spawn(writer_task(sink, cmd_rx, pending.clone()));
        tokio::spawn(reader_task(source, pending.clone(), notice_tx));

        MopidyHandle {
            tx: cmd_tx,
            pending,
            call_timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
        }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

/// Route one parsed frame.  Returns the event to forward, if it is one.
async fn route_frame(val: Value, pending: &PendingMap) -> Option<MopidyEvent> {
    if val.get("event").is_some() {
        return Some(MopidyEvent { raw: val });
    }
    let Some(req_id) = val.get("id").and_then(Value::as_u64) else {
        debug!("mopidy reader: frame without id or event: {}", val);
        return None;
    };
    let Some(tx) = pending.lock().await.remove(&req_id) else {
        debug!("mopidy reader: response for unknown req={}", req_id);
        return None;
    };
    let result = match val.get("error") {
        None => {
            debug!("mopidy reader: response req={} ok", req_id);
            Ok(val.get("result").cloned().unwrap_or(Value::Null))
        }
        Some(err) => {
            let msg = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            debug!("mopidy reader: response req={} err={}", req_id, msg);
            Err(anyhow::anyhow!("mopidy error: {}", msg))
        }
    };
    let _ = tx.send(result);
    None
}

async fn reader_task(
    mut source: SplitStream<WsStream>,
    pending: PendingMap,
    notice_tx: mpsc::Sender<MopidyNotice>,
) {
    loop {
        let text = match source.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    debug!("mopidy reader: non-utf8 frame: {}", e);
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!("mopidy reader: close frame {:?}", frame);
                fail_pending(&pending, "mopidy connection closed").await;
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("mopidy reader: read error: {}", e);
                fail_pending(&pending, "mopidy read error").await;
                break;
            }
            None => {
                debug!("mopidy reader: connection closed");
                fail_pending(&pending, "mopidy connection closed").await;
                break;
            }
        };

        let val: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!("mopidy reader: invalid json '{}': {}", text.trim(), e);
                continue;
            }
        };

        if let Some(evt) = route_frame(val, &pending).await {
            debug!("mopidy reader: event {}", evt.raw);
            if notice_tx.send(MopidyNotice::Event(evt)).await.is_err() {
                break;
            }
        }
    }
    let _ = notice_tx.send(MopidyNotice::Disconnected).await;
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: PendingMap,
) {
    while let Some(req) = rx.recv().await {
        // Caller already timed out while this sat in the queue.
        if req.reply.is_closed() {
            debug!("mopidy writer: dropping abandoned req={}", req.req_id);
            continue;
        }
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mopidy writer: send req={} payload={}", req.req_id, req.payload);
        if let Err(e) = sink.send(Message::Text(req.payload.into())).await {
            warn!("mopidy writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mopidy write error: {}", e)));
            }
            break;
        }
    }
    debug!("mopidy writer: task exiting");
}

// ── MediaDaemon over a (re)connecting handle ──────────────────────────────────

/// Shared view of the current connection.  The supervisor swaps the handle
/// on reconnect; handlers only ever see `MediaDaemon`.
#[derive(Clone, Default)]
pub struct MopidyClient {
    handle: Arc<RwLock<Option<MopidyHandle>>>,
}

impl MopidyClient {
    pub async fn attach(&self, handle: MopidyHandle) {
        *self.handle.write().await = Some(handle);
    }

    pub async fn detach(&self) {
        self.handle.write().await.take();
    }

    pub async fn is_connected(&self) -> bool {
        self.handle
            .read()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_closed())
    }

    async fn call(&self, method: &str) -> Result<Value> {
        let handle = self
            .handle
            .read()
            .await
            .clone()
            .ok_or_else(|| RelayError::daemon("not connected to mopidy"))?;
        handle
            .call(method, json!({}))
            .await
            .map_err(|e| RelayError::daemon(e.to_string()))
    }
}

#[async_trait]
impl MediaDaemon for MopidyClient {
    async fn get_tracklist(&self) -> Result<Vec<QueueEntry>> {
        let result = self.call("core.tracklist.get_tl_tracks").await?;
        Ok(QueueEntry::from_tl_tracks(TlTrack::list_from_value(result)?))
    }

    async fn get_current_index(&self) -> Result<Option<usize>> {
        let result = self.call("core.tracklist.index").await?;
        Ok(result.as_u64().map(|i| i as usize))
    }

    async fn get_current_track(&self) -> Result<Option<TlTrack>> {
        let result = self.call("core.playback.get_current_tl_track").await?;
        TlTrack::optional_from_value(result)
    }

    async fn advance(&self) -> Result<()> {
        self.call("core.playback.next").await?;
        Ok(())
    }
}
