use crate::config::NetConfig;
use crate::error::SourceError;
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// Rate-limited GET client shared by the screener and EDGAR sources.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    config: NetConfig,
    permits: Arc<Semaphore>,
}

enum Attempt {
    Throttled(SourceError),
    Failed(SourceError),
}

impl Attempt {
    fn into_error(self) -> SourceError {
        match self {
            Attempt::Throttled(e) | Attempt::Failed(e) => e,
        }
    }
}

impl HttpClient {
    pub fn new(user_agent: &str, config: &NetConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        })
    }

    /// Fetch a URL as text. Only 429/503 are retried, with exponential backoff.
    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::spawn(
            strategy,
            || self.attempt(url),
            |e: &Attempt| matches!(e, Attempt::Throttled(_)),
        )
        .await
        .map_err(Attempt::into_error)
    }

    async fn attempt(&self, url: &str) -> Result<String, Attempt> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Attempt::Failed(SourceError::unavailable(url, e)))?;

        self.polite_delay().await;
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| Attempt::Failed(SourceError::unavailable(url, e)))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            warn!("Rate limited ({}) on {}", status, url);
            return Err(Attempt::Throttled(SourceError::unavailable(url, format!("HTTP {}", status))));
        }
        if !status.is_success() {
            return Err(Attempt::Failed(SourceError::unavailable(url, format!("HTTP {}", status))));
        }

        resp.text()
            .await
            .map_err(|e| Attempt::Failed(SourceError::unavailable(url, e)))
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter_ms = rand::rng().random_range(0..=self.config.jitter_ms);
        let total = self.config.request_delay_ms + jitter_ms;
        if total > 0 {
            sleep(Duration::from_millis(total)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn quick() -> NetConfig {
        NetConfig {
            timeout_secs: 2,
            request_delay_ms: 0,
            jitter_ms: 0,
            max_retries: 2,
            max_in_flight: 2,
        }
    }

    #[tokio::test]
    async fn test_non_success_is_unavailable() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let client = HttpClient::new("test-agent", &quick()).unwrap();
        let err = client.get_text(&server.url("/missing")).await.unwrap_err();

        assert!(matches!(err, SourceError::Unavailable { .. }));
        // 404 is not retried
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_throttled_requests_are_retried_then_fail() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/busy");
                then.status(429);
            })
            .await;

        let mut cfg = quick();
        cfg.max_retries = 1;
        let client = HttpClient::new("test-agent", &cfg).unwrap();
        let err = client.get_text(&server.url("/busy")).await.unwrap_err();

        assert!(matches!(err, SourceError::Unavailable { .. }));
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_sends_configured_user_agent() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ua").header("user-agent", "insider-tracker/test");
                then.status(200).body("ok");
            })
            .await;

        let client = HttpClient::new("insider-tracker/test", &quick()).unwrap();
        assert_eq!(client.get_text(&server.url("/ua")).await.unwrap(), "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200).body("late").delay(Duration::from_secs(4));
            })
            .await;

        let mut cfg = quick();
        cfg.timeout_secs = 1;
        let client = HttpClient::new("test-agent", &cfg).unwrap();

        let started = std::time::Instant::now();
        let err = client.get_text(&server.url("/slow")).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(elapsed >= Duration::from_millis(900), "gave up after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3500), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_in_flight_requests_are_capped() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page");
                then.status(200).body("ok").delay(Duration::from_millis(300));
            })
            .await;

        // 6 requests, 2 at a time: at least three 300ms waves
        let client = HttpClient::new("test-agent", &quick()).unwrap();
        let url = server.url("/page");
        let started = std::time::Instant::now();
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let client = client.clone();
                let url = url.clone();
                tokio::spawn(async move { client.get_text(&url).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "ok");
        }
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(850), "6 requests finished in {:?}", elapsed);
        mock.assert_hits_async(6).await;
    }
}
