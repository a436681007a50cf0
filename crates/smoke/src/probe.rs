//! Site preflight - checks the site under test answers before launching browsers

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{SmokeError, SmokeResult};

/// HTTP reachability checks against the site under test
pub struct SiteProbe {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl SiteProbe {
    pub fn new(base_url: impl Into<String>) -> SmokeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            poll_interval: Duration::from_millis(500),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Status code returned for `url`
    pub async fn status_of(&self, url: &str) -> SmokeResult<u16> {
        let resp = self.client.get(url).send().await?;
        Ok(resp.status().as_u16())
    }

    /// Poll the base URL until it returns a success status
    pub async fn wait_until_reachable(&self, timeout: Duration) -> SmokeResult<()> {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.client.get(&self.base_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("{} is reachable ({})", self.base_url, resp.status());
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Preflight returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {}...", self.base_url);
                    }
                    if !e.is_connect() {
                        warn!("Preflight error: {}", e);
                    }
                }
            }

            if start.elapsed() >= timeout {
                return Err(SmokeError::SiteUnreachable {
                    url: self.base_url.clone(),
                    attempts,
                });
            }

            sleep(self.poll_interval).await;
        }
    }
}
