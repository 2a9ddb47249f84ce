/// Slack Events API receiver.
///
/// `POST /slack/events` answers Slack's URL verification handshake and turns
/// `message` / `app_mention` events into chat commands.  Slack expects an
/// answer within three seconds, so commands run on their own task and the
/// request is acknowledged straight away; the reply goes out through
/// `chat.postMessage`.
///
/// Every request must carry a valid `X-Slack-Signature` for the app's
/// signing secret, otherwise it is answered 401 and never parsed.
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Local};
use relay_proto::commands::CommandController;
use relay_proto::dispatch::{AnnouncementTarget, ChannelReply, ChatSender};
use relay_proto::slack::{verify_signature, Envelope, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::mopidy::MopidyClient;

#[derive(Clone)]
pub struct HttpState {
    controller: Arc<CommandController>,
    sender: Arc<dyn ChatSender>,
    bot_token: String,
    signing_secret: String,
    mopidy: MopidyClient,
    started_at: DateTime<Local>,
}

impl HttpState {
    pub fn new(
        controller: Arc<CommandController>,
        sender: Arc<dyn ChatSender>,
        bot_token: String,
        signing_secret: String,
        mopidy: MopidyClient,
    ) -> Self {
        Self {
            controller,
            sender,
            bot_token,
            signing_secret,
            mopidy,
            started_at: Local::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    mopidy_connected: bool,
    started_at: DateTime<Local>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: HttpState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP server listening at {}", addr);

        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn slack_events(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = verify_signature(
        &state.signing_secret,
        header_str(&headers, TIMESTAMP_HEADER),
        header_str(&headers, SIGNATURE_HEADER),
        &body,
        chrono::Utc::now().timestamp(),
    ) {
        warn!("Slack events: rejected request: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let envelope = match Envelope::from_slice(&body) {
        Ok(env) => env,
        Err(e) => {
            warn!("Slack events: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match envelope {
        Envelope::UrlVerification { challenge } => {
            info!("Slack events: URL verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Envelope::EventCallback { event } => {
            if let Some((cmd, channel)) = event.command() {
                let reply = ChannelReply::new(
                    Arc::clone(&state.sender),
                    AnnouncementTarget::new(channel, state.bot_token.clone()),
                );
                let controller = Arc::clone(&state.controller);
                tokio::spawn(async move {
                    controller.handle(cmd, &reply).await;
                });
            } else {
                debug!("Slack events: ignoring {} event", event.kind);
            }
            StatusCode::OK.into_response()
        }
        Envelope::Unsupported => StatusCode::OK.into_response(),
    }
}

async fn health(State(state): State<HttpState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        mopidy_connected: state.mopidy.is_connected().await,
        started_at: state.started_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use relay_proto::daemon::MediaDaemon;
    use relay_proto::models::{QueueEntry, TlTrack};
    use relay_proto::{RelayError, Result};
    use serde_json::Value;
    use sha2::Sha256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const SECRET: &str = "test-signing-secret";

    struct ChannelSender(mpsc::UnboundedSender<(String, String)>);

    #[async_trait]
    impl ChatSender for ChannelSender {
        async fn post_message(&self, target: &AnnouncementTarget, text: &str) -> Result<()> {
            let _ = self.0.send((target.channel.clone(), text.to_string()));
            Ok(())
        }
    }

    /// Daemon that is down for reads but counts skips.
    #[derive(Default)]
    struct SkipCounter {
        advances: AtomicUsize,
    }

    #[async_trait]
    impl MediaDaemon for SkipCounter {
        async fn get_tracklist(&self) -> Result<Vec<QueueEntry>> {
            Err(RelayError::daemon("not connected to mopidy"))
        }

        async fn get_current_index(&self) -> Result<Option<usize>> {
            Err(RelayError::daemon("not connected to mopidy"))
        }

        async fn get_current_track(&self) -> Result<Option<TlTrack>> {
            Err(RelayError::daemon("not connected to mopidy"))
        }

        async fn advance(&self) -> Result<()> {
            self.advances.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        state: HttpState,
        daemon: Arc<SkipCounter>,
        replies: mpsc::UnboundedReceiver<(String, String)>,
    }

    fn harness() -> Harness {
        let (tx, replies) = mpsc::unbounded_channel();
        let daemon = Arc::new(SkipCounter::default());
        let controller = Arc::new(CommandController::new(daemon.clone(), None, None));
        let state = HttpState::new(
            controller,
            Arc::new(ChannelSender(tx)),
            "xoxb".into(),
            SECRET.into(),
            MopidyClient::default(),
        );
        Harness { state, daemon, replies }
    }

    fn sign(secret: &str, ts: &str, body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("v0:{}:{}", ts, body).as_bytes());
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn request(body: &str, headers: &[(&str, String)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn signed_at(body: &Value, ts: i64) -> Request<Body> {
        let body = body.to_string();
        let ts = ts.to_string();
        let sig = sign(SECRET, &ts, &body);
        request(&body, &[(TIMESTAMP_HEADER, ts), (SIGNATURE_HEADER, sig)])
    }

    fn signed(body: Value) -> Request<Body> {
        signed_at(&body, chrono::Utc::now().timestamp())
    }

    fn skip_event(channel: &str) -> Value {
        json!({
            "type": "event_callback",
            "event": { "type": "message", "channel": channel, "user": "U1", "text": "skip" }
        })
    }

    async fn next_reply(rx: &mut mpsc::UnboundedReceiver<(String, String)>) -> (String, String) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn assert_no_reply(rx: &mut mpsc::UnboundedReceiver<(String, String)>) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_url_verification() {
        let h = harness();
        let resp = router(h.state)
            .oneshot(signed(json!({ "type": "url_verification", "challenge": "3eZbrw1a" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["challenge"], "3eZbrw1a");
    }

    #[tokio::test]
    async fn test_command_replies_in_source_channel() {
        let mut h = harness();
        let resp = router(h.state)
            .oneshot(signed(json!({
                "type": "event_callback",
                "event": { "type": "app_mention", "channel": "C42", "text": "<@U0BOT> queue" }
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Daemon down: the queue command apologises.
        let (channel, text) = next_reply(&mut h.replies).await;
        assert_eq!(channel, "C42");
        assert_eq!(text, "Could not get queue :(");
    }

    #[tokio::test]
    async fn test_signed_skip_advances() {
        let mut h = harness();
        let resp = router(h.state).oneshot(signed(skip_event("C7"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let (_, text) = next_reply(&mut h.replies).await;
        assert_eq!(text, "Skipping current song");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.daemon.advances.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsigned_request_rejected() {
        let mut h = harness();
        let resp = router(h.state)
            .oneshot(request(&skip_event("CANY").to_string(), &[]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_no_reply(&mut h.replies).await;
        assert_eq!(h.daemon.advances.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tampered_body_rejected() {
        let mut h = harness();
        let ts = chrono::Utc::now().timestamp().to_string();
        let original = skip_event("C7").to_string();
        let sig = sign(SECRET, &ts, &original);
        let forged = skip_event("CANY").to_string();
        let resp = router(h.state)
            .oneshot(request(&forged, &[(TIMESTAMP_HEADER, ts), (SIGNATURE_HEADER, sig)]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_no_reply(&mut h.replies).await;
        assert_eq!(h.daemon.advances.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let mut h = harness();
        let ten_minutes_ago = chrono::Utc::now().timestamp() - 600;
        let resp = router(h.state)
            .oneshot(signed_at(&skip_event("C7"), ten_minutes_ago))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_no_reply(&mut h.replies).await;
        assert_eq!(h.daemon.advances.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let h = harness();
        let body = skip_event("C7").to_string();
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign("someone-else", &ts, &body);
        let resp = router(h.state)
            .oneshot(request(&body, &[(TIMESTAMP_HEADER, ts), (SIGNATURE_HEADER, sig)]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_bad_request() {
        let h = harness();
        let resp = router(h.state)
            .oneshot(signed(json!({ "no_type": true })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let resp = router(h.state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mopidy_connected"], false);
    }
}
