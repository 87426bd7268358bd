//! Globally rate-limited notification dispatch.
//!
//! Every feed shares one [`Dispatcher`]. Its lock covers the spacing wait, the
//! send and the timestamp update, so sends leave strictly one at a time in
//! lock arrival order and any two successful sends are at least
//! `min_spacing` apart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ChatId;
use crate::telegram::Notifier;
use crate::Result;

/// Pacing state shared by all pollers. Lives only in memory.
#[derive(Debug, Default)]
pub struct DispatchState {
    /// Completion time of the last successful send
    pub last_sent: Option<Instant>,
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    min_spacing: Duration,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, min_spacing: Duration) -> Self {
        Self {
            notifier,
            min_spacing,
            state: Mutex::new(DispatchState::default()),
        }
    }

    /// Send one notification, waiting out the remaining spacing first.
    ///
    /// A failed send leaves the last-send timestamp untouched.
    pub async fn dispatch(&self, target: &ChatId, text: &str, token: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_sent {
            let elapsed = last.elapsed();
            if elapsed < self.min_spacing {
                let wait = self.min_spacing - elapsed;
                debug!(target_chat = %target, wait_ms = wait.as_millis() as u64, "Rate limit: waiting");
                tokio::time::sleep(wait).await;
            }
        }

        self.notifier.send(target, text, token).await?;
        state.last_sent = Some(Instant::now());
        Ok(())
    }
}
