use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::dispatcher::Dispatcher;
use crate::fetcher::Fetcher;
use crate::poller::FeedPoller;

/// Starts one poller per configured feed and supervises them until shutdown.
pub struct Orchestrator {
    config: Arc<Config>,
    db: Arc<Database>,
    dispatcher: Arc<Dispatcher>,
    fetcher: Arc<Fetcher>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        db: Arc<Database>,
        dispatcher: Arc<Dispatcher>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        Self {
            config,
            db,
            dispatcher,
            fetcher,
        }
    }

    /// Spawn every poller, then wait for all of them to stop.
    ///
    /// Each task is awaited on its own, so a poller that panics is logged with
    /// its feed name and the others keep running.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let handles: Vec<(String, JoinHandle<()>)> = self
            .config
            .feeds
            .iter()
            .cloned()
            .map(|feed| {
                let poller = FeedPoller::new(
                    feed,
                    &self.config.telegram_token,
                    self.db.clone(),
                    self.dispatcher.clone(),
                    self.fetcher.clone(),
                );
                let name = poller.name().to_string();
                (name, tokio::spawn(poller.run(shutdown.clone())))
            })
            .collect();

        info!("Monitored feeds: {}", handles.len());

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!(feed = %name, error = %e, "Feed poller terminated abnormally");
            }
        }

        info!("All pollers stopped");
    }
}
