mod core;
mod http;
mod mopidy;

use std::sync::Arc;
use std::time::Duration;

use relay_proto::commands::CommandController;
use relay_proto::config::Config;
use relay_proto::daemon::MediaDaemon;
use relay_proto::dispatch::ChatSender;
use relay_proto::enrich::{IrisMetadata, MetadataSource};
use relay_proto::handler::TrackEventHandler;
use relay_proto::slack::SlackClient;
use relay_proto::stats::{IcecastStats, StatsSource};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::mopidy::{MopidyClient, MopidyDriver};

const HTTP_TIMEOUT_SECS: u64 = 15;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging + stderr
    let log_path = relay_proto::platform::log_path();
    std::fs::create_dir_all(relay_proto::platform::data_dir())?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,relay_daemon=debug,relay_proto=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    let targets = config.targets()?;

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("mopidy-relay/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?;

    // Side channels
    let metadata: Option<Arc<dyn MetadataSource>> =
        config.metadata.queue_metadata_url.as_ref().map(|url| {
            info!("Queue metadata from {}", url);
            Arc::new(IrisMetadata::new(
                http_client.clone(),
                url.clone(),
                config.metadata.key_prefix.clone(),
            )) as Arc<dyn MetadataSource>
        });
    let stats: Option<Arc<dyn StatsSource>> = config.stats.base_url.as_ref().map(|url| {
        info!("Listener stats from {}", url);
        Arc::new(IcecastStats::new(http_client.clone(), url)) as Arc<dyn StatsSource>
    });
    let sender: Arc<dyn ChatSender> =
        Arc::new(SlackClient::new(http_client, config.slack.api_base.clone()));

    let mopidy = MopidyClient::default();
    let daemon: Arc<dyn MediaDaemon> = Arc::new(mopidy.clone());

    let handler = Arc::new(TrackEventHandler::new(
        Arc::clone(&daemon),
        metadata.clone(),
        Arc::clone(&sender),
        targets.clone(),
    ));
    let controller = Arc::new(CommandController::new(daemon, metadata, stats));

    // Event channel: all external inputs funnel into RelayCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::RelayEvent>(256);

    if config.http.enabled {
        let state = http::HttpState::new(
            controller,
            Arc::clone(&sender),
            targets.now_playing.token.clone(),
            config.signing_secret()?.to_string(),
            mopidy.clone(),
        );
        http::start_server(config.http.bind_address.clone(), config.http.port, state);
    } else {
        info!("HTTP server disabled; chat commands are off");
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received ctrl-c");
            let _ = shutdown_tx.send(core::RelayEvent::Shutdown).await;
        }
    });

    let relay = core::RelayCore::new(
        MopidyDriver::new(config.mopidy.ws_url.clone()),
        mopidy,
        handler,
        event_tx,
    );

    info!("Relay started, announcing to {}", targets.now_playing.channel);
    relay.run(event_rx).await
}
