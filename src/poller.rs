use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::canonical::canonicalize;
use crate::config::FeedConfig;
use crate::db::Database;
use crate::dispatcher::Dispatcher;
use crate::feed::{parse_feed, Entry};
use crate::fetcher::Fetcher;
use crate::formatter::format_message;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoLink,
    AlreadySeen,
}

#[derive(Debug)]
pub enum EntryOutcome {
    Dispatched,
    Skipped(SkipReason),
    Failed(Error),
}

/// Summary of one fetch/process cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: bool,
    pub malformed: bool,
    pub entries: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Per-feed control loop: fetch, parse, dedup, dispatch, persist, sleep.
pub struct FeedPoller {
    feed: FeedConfig,
    token: String,
    db: Arc<Database>,
    dispatcher: Arc<Dispatcher>,
    fetcher: Arc<Fetcher>,
}

impl FeedPoller {
    pub fn new(
        feed: FeedConfig,
        default_token: &str,
        db: Arc<Database>,
        dispatcher: Arc<Dispatcher>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        let token = feed.token(default_token).to_string();
        Self {
            feed,
            token,
            db,
            dispatcher,
            fetcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.feed.name
    }

    /// Poll until `shutdown` turns true (or its sender goes away).
    ///
    /// Shutdown is observed before each cycle and during the interval sleep;
    /// a cycle already running, including any send in flight, completes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.feed.check_interval();
        info!(
            feed = %self.feed.name,
            url = %self.feed.url,
            interval_secs = interval.as_secs(),
            "Started monitoring"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.poll_once().await;
            debug!(feed = %self.feed.name, ?report, "Cycle complete");

            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        info!(feed = %self.feed.name, "Stopped monitoring");
    }

    /// Run a single cycle. Failures are logged and counted, never propagated.
    pub async fn poll_once(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let bytes = match self.fetcher.fetch(&self.feed.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(feed = %self.feed.name, url = %self.feed.url, error = %e, "Failed to fetch feed");
                return report;
            }
        };
        report.fetched = true;

        let parsed = parse_feed(&bytes);
        if let Some(reason) = &parsed.malformed {
            report.malformed = true;
            warn!(
                feed = %self.feed.name,
                recovered = parsed.entries.len(),
                error = %reason,
                "Feed parsing error"
            );
        }

        for entry in parsed.chronological() {
            report.entries += 1;
            match self.process_entry(&entry).await {
                EntryOutcome::Dispatched => report.dispatched += 1,
                EntryOutcome::Skipped(reason) => {
                    debug!(feed = %self.feed.name, entry_id = %entry.id, ?reason, "Skipping entry");
                    report.skipped += 1;
                }
                EntryOutcome::Failed(e) => {
                    error!(
                        feed = %self.feed.name,
                        entry_id = %entry.id,
                        link = entry.link.as_deref().unwrap_or(""),
                        error = %e,
                        "Failed to process entry"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.dispatched > 0 {
            info!(feed = %self.feed.name, count = report.dispatched, "Posted new entries");
        }
        report
    }

    /// Announce one entry unless it was announced before. The entry is
    /// recorded only after the send succeeded.
    ///
    /// The seen-check runs outside the dispatcher lock. Two feeds carrying the
    /// same entry are deduplicated once the first one has recorded it, but if
    /// both check it before either records, both will post it.
    pub async fn process_entry(&self, entry: &Entry) -> EntryOutcome {
        let Some(raw_link) = entry.link.as_deref() else {
            return EntryOutcome::Skipped(SkipReason::NoLink);
        };
        let link = canonicalize(raw_link);

        match self.db.is_seen(&entry.id, &link).await {
            Ok(true) => return EntryOutcome::Skipped(SkipReason::AlreadySeen),
            Ok(false) => {}
            Err(e) => return EntryOutcome::Failed(e),
        }

        let text = format_message(
            &self.feed.message_template,
            entry,
            &link,
            self.feed.rhash.as_deref(),
        );

        if let Err(e) = self
            .dispatcher
            .dispatch(&self.feed.target_chat_id, &text, &self.token)
            .await
        {
            return EntryOutcome::Failed(e);
        }

        if let Err(e) = self.db.record_seen(&entry.id, &link, entry.published).await {
            error!(
                feed = %self.feed.name,
                entry_id = %entry.id,
                "Entry was sent but could not be recorded; it will be sent again"
            );
            return EntryOutcome::Failed(e);
        }

        info!(feed = %self.feed.name, title = %entry.title, link = %link, "Posted new entry");
        EntryOutcome::Dispatched
    }
}

/// Sleep for `interval`; returns true if shutdown was requested first.
async fn sleep_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
