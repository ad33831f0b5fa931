//! Shared text fetcher: one `reqwest::Client` with a bounded timeout and a
//! small fixed retry count.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("station-monitor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::network("<client>", e))?;
        Ok(Self { client, retry })
    }

    /// GET `url` and return the body as text.
    ///
    /// Transport errors and 5xx responses are retried; any other non-success
    /// status fails straight away.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            debug!(%url, attempt, "GET");
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .text()
                        .await
                        .map_err(|e| MonitorError::network(url, e));
                }
                Ok(resp) if should_retry(resp.status()) && attempt < self.retry.max_retries => {
                    warn!(%url, status = %resp.status(), attempt, "retrying");
                }
                Ok(resp) => {
                    return Err(MonitorError::network(url, format!("http status {}", resp.status())));
                }
                Err(e) if attempt < self.retry.max_retries => {
                    warn!(%url, error = %e, attempt, "retrying");
                }
                Err(e) => return Err(MonitorError::network(url, e)),
            }
            attempt += 1;
            sleep(self.retry.delay).await;
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
