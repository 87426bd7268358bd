use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_herald::config::Config;
use feed_herald::db::Database;
use feed_herald::dispatcher::Dispatcher;
use feed_herald::fetcher::Fetcher;
use feed_herald::orchestrator::Orchestrator;
use feed_herald::telegram::TelegramNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FEED_HERALD_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("feed_herald={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Loaded {} feeds from {}", config.feeds.len(), config_path);

    // Without durable dedup state nothing can be announced safely
    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    db.initialize().await.context("Failed to initialize database")?;
    info!("Database initialized");

    let notifier = Arc::new(TelegramNotifier::new(config.send_timeout())?);
    let dispatcher = Arc::new(Dispatcher::new(notifier, config.publication_delay()));
    let fetcher = Arc::new(Fetcher::new(config.fetch_timeout())?);

    let config = Arc::new(config);
    let orchestrator = Orchestrator::new(config, Arc::new(db), dispatcher, fetcher);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut pollers = tokio::spawn(orchestrator.run(shutdown_rx));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received...");
            let _ = shutdown_tx.send(true);
            pollers.await?;
        }
        result = &mut pollers => {
            result?;
            warn!("All pollers exited without a shutdown signal");
        }
    }

    info!("FeedHerald stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
