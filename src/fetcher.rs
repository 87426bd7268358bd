use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use crate::{Error, Result};

/// HTTP feed fetcher shared by all pollers.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("FeedHerald/1.0 (RSS Announcer)")
            .build()?;

        Ok(Self { client })
    }

    /// Fetch the raw feed body. Transport errors, timeouts and non-2xx
    /// statuses are all failures.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(url.to_string())
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16(), url.to_string()));
        }

        Ok(response.bytes().await?)
    }
}
