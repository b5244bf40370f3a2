use anyhow::Context;
use poller::{AlarmScheduler, DesktopSink, Poller, PollerCommand, StoreConfigProvider};
use reddit_client::RedditClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{keys, StateStore, Tier};
use subwatch_core::Config;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "subwatch=debug,poller=debug,reddit_client=debug,store=info".to_string()
        }))
        .init();

    info!("Starting Subwatch - Reddit keyword watcher");

    let data_dir = data_dir();
    let store = Arc::new(StateStore::open(data_dir.join("state.json")).await);
    seed_config(&store, &data_dir).await;

    let client = Arc::new(RedditClient::new()?);
    let (trigger_tx, trigger_rx) = mpsc::channel(8);
    let (command_tx, command_rx) = mpsc::channel::<PollerCommand>(8);
    let scheduler = Arc::new(AlarmScheduler::new(Arc::clone(&store), trigger_tx));
    let sink = Arc::new(DesktopSink::new(Arc::clone(&store)));
    let config = Arc::new(StoreConfigProvider::new(Arc::clone(&store)));

    let engine = Arc::new(Poller::new(
        Arc::clone(&store),
        client,
        Arc::clone(&scheduler) as Arc<dyn poller::DurableScheduler>,
        sink,
        config,
    ));

    // Re-arm a trigger left behind by a previous process, then start. The
    // first cycle reschedules anyway and duplicate fires are absorbed by
    // dedup.
    scheduler.resume().await;
    engine.start().await;

    let run = tokio::spawn(Arc::clone(&engine).run(trigger_rx, command_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    engine.stop().await;
    drop(command_tx);
    run.abort();

    Ok(())
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("subwatch"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Seeds the stored config from the user-editable TOML file when present.
/// The file wins over the stored copy; absence keeps whatever is stored.
async fn seed_config(store: &StateStore, data_dir: &Path) {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("subwatch.toml"));

    match Config::from_toml_file(&path) {
        Ok(config) => {
            info!(path = %path.display(), "loaded config file");
            store.set(Tier::Durable, keys::CONFIG, &config).await;
        }
        Err(e) => {
            warn!(path = %path.display(), "config file not loaded ({e}), using stored config");
        }
    }
}
