//! Shipment monitor service binary.
//!
//! Standalone HTTP service for board webhook handling.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use notify::{EmailSender, Notifier};
use shipwatch::assist::AssistClassifier;
use shipwatch::board::BoardClient;
use shipwatch::config::Config;
use shipwatch::contacts::ContactsClient;
use shipwatch::dedup::DedupSuppressor;
use shipwatch::router::NotificationRouter;
use shipwatch::server::{self, AppState};
use shipwatch::tracker::{StalenessTracker, TrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("shipwatch=info".parse()?))
        .init();

    info!("Starting shipment monitor...");

    // Mandatory configuration (board token, chat credentials) is fatal here,
    // before any webhook is accepted.
    let config = Config::from_env().context("Configuration error")?;

    let board = BoardClient::new(&config.board_api_token)
        .context("Failed to create board client")?;
    info!(boards = config.boards.len(), "Board client configured");

    let assist = AssistClassifier::from_env().map(Arc::new);
    if assist.is_some() {
        info!("Assisted classification enabled");
    } else {
        info!("No ASSIST_API_KEY configured - using rule cascade only");
    }

    // Optional collaborators log their own absence exactly once.
    let email = EmailSender::from_env();
    let contacts = ContactsClient::from_env();

    let notifier = Notifier::from_env();
    let router = NotificationRouter::new(
        notifier,
        email,
        contacts,
        config.email_reply_to.clone(),
        config.email_bcc.clone(),
    );

    let tracker = Arc::new(StalenessTracker::new(TrackerConfig {
        stale_threshold_hours: config.stale_threshold_hours,
        stale_realert: config.stale_realert,
    }));

    let state = AppState {
        board: Arc::new(board),
        assist,
        tracker: Arc::clone(&tracker),
        dedup: Arc::new(DedupSuppressor::new(config.dedup_window_mins)),
        router: Arc::new(router),
        config: Arc::new(config),
    };

    // Periodic sweep evicts entities that stopped reporting entirely.
    {
        let tracker = Arc::clone(&tracker);
        let interval_mins = state.config.sweep_interval_mins.max(1);
        let max_idle = chrono::Duration::days(state.config.sweep_max_idle_days);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_mins * 60));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                tracker.sweep(chrono::Utc::now(), max_idle).await;
            }
        });
    }

    let port = state.config.port;
    let app = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "Listening for board webhooks");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| {
            warn!(error = %e, "Server exited");
            e
        })
        .context("Server error")
}
