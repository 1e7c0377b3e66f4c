use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tree_notes::app_state::AppState;
use tree_notes::config::loader::{ConfigLoader, config_exists};
use tree_notes::models::identity::SessionUser;
use tree_notes::observability::init_tracing;
use tree_notes::realtime::feed::PollingChangeFeed;
use tree_notes::storage::repository::StaticSession;
use tree_notes::storage::rest::RestBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;
    let _log_guard = init_tracing(&config.logging);

    info!("Starting {} ({})...", config.app_name, config.environment);
    if !config_exists() {
        info!("No config.yaml found, using defaults and environment");
    }

    let backend = Arc::new(RestBackend::new(config.backend.clone(), &config.notification)?);
    info!("REST backend initialized: {}", config.backend.url);

    let session = match &config.session.user_id {
        Some(id) => {
            let mut user = SessionUser::new(id);
            if let Some(email) = &config.session.email {
                user = user.with_email(email);
            }
            info!("Signed in as {}", user.id);
            StaticSession::signed_in(user)
        }
        None => {
            warn!("No session user configured, writes will be rejected");
            StaticSession::default()
        }
    };

    let state = AppState::new(
        config.clone(),
        backend.clone(),
        backend.clone(),
        backend,
        Arc::new(session),
    );
    info!("Application state created");

    let feed = Arc::new(PollingChangeFeed::new(
        &config.backend.notes_table,
        Duration::from_secs(config.feed.poll_interval_secs.max(1)),
        config.feed.channel_capacity,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = {
        let feed = feed.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { feed.run(shutdown).await })
    };
    let driver = state.sync_driver().spawn(&*feed, shutdown_rx);

    let markers_state = state.clone();
    let _markers_log = state.store.subscribe(move |annotations| {
        info!("{} note(s) on the tree", annotations.len());
        for marker in markers_state.markers() {
            info!(
                "  {} by {} at ({:.2}, {:.2}, {:.2})",
                marker.annotation.id,
                marker.author_label,
                marker.annotation.x,
                marker.annotation.y,
                marker.annotation.z
            );
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(poller, driver);
    info!("{}", state.metrics.gather());

    Ok(())
}
