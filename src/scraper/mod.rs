pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::{NetConfig, ScreenerConfig};
use crate::error::SourceError;
use crate::models::RawRow;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::{NoTable, TableMatcher, parse_screener_table};

// ── Query ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenerQuery {
    pub ticker_filter: Option<String>,
    pub lookback_days: u32,
    pub max_rows: u32,
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable screener abstraction.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Typed fetch: tells the caller why a result is empty.
    async fn fetch_rows(&self, query: &ScreenerQuery) -> Result<Vec<RawRow>, SourceError>;

    /// Best-effort fetch: every failure collapses to an empty sequence.
    async fn extract(&self, query: &ScreenerQuery) -> Vec<RawRow> {
        match self.fetch_rows(query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }
}

// ── OpenInsider scraper ───────────────────────────────────────────────────────

pub struct OpenInsiderScraper {
    client: HttpClient,
    base_url: String,
    site_marker: String,
    matchers: Vec<TableMatcher>,
}

impl OpenInsiderScraper {
    pub fn new(config: &ScreenerConfig, net: &NetConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(&config.user_agent, net)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            site_marker: config.site_marker.to_lowercase(),
            matchers: TableMatcher::default_chain(&config.table_class),
        })
    }

    /// Screener URL with the upstream's query-string keys.
    pub fn screener_url(&self, query: &ScreenerQuery) -> Result<Url> {
        let ticker = query.ticker_filter.as_deref().unwrap_or("").trim().to_uppercase();
        let fd = query.lookback_days.to_string();
        let nop = query.max_rows.to_string();
        Url::parse_with_params(
            &self.base_url,
            &[
                ("s", ticker.as_str()),
                ("o", ""),
                ("pl", ""),
                ("ph", ""),
                ("fd", fd.as_str()),
                ("td", "0"),
                ("nop", nop.as_str()),
            ],
        )
        .with_context(|| format!("Bad screener base URL {}", self.base_url))
    }
}

#[async_trait]
impl TransactionSource for OpenInsiderScraper {
    async fn fetch_rows(&self, query: &ScreenerQuery) -> Result<Vec<RawRow>, SourceError> {
        let url = self
            .screener_url(query)
            .map_err(|e| SourceError::unavailable(&self.base_url, format!("{:#}", e)))?;
        info!("Fetching screener ({})", url);

        let html = self.client.get_text(url.as_str()).await?;

        if !self.site_marker.is_empty() && !html.to_lowercase().contains(&self.site_marker) {
            return Err(SourceError::structure_changed(
                format!("site marker {:?} absent; likely a bot-check page", self.site_marker),
                &html,
            ));
        }

        let rows = parse_screener_table(&html, &self.matchers, Some(&url)).map_err(|NoTable| {
            SourceError::structure_changed("no table matched any discovery strategy", &html)
        })?;

        match rows.first() {
            Some(first) => debug!(
                "Screener columns ({}): {}",
                first.len(),
                first.columns().collect::<Vec<_>>().join(" | ")
            ),
            None => debug!("Screener table had no rows matching its header"),
        }
        info!("Screener: {} rows", rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use httpmock::prelude::*;

    const PAGE: &str = r#"<html><title>OpenInsider</title><body>
      <table class="tinytable">
        <tr><th>Ticker</th><th>Insider Name</th><th>Qty</th></tr>
        <tr><td>ACME</td><td>Roe Jane</td><td>1,000</td></tr>
      </table></body></html>"#;

    fn query() -> ScreenerQuery {
        ScreenerQuery {
            ticker_filter: Some("acme".into()),
            lookback_days: 7,
            max_rows: 50,
        }
    }

    fn scraper_for(server: &MockServer) -> OpenInsiderScraper {
        let cfg = AppConfig::for_mock(&server.base_url());
        OpenInsiderScraper::new(&cfg.screener, &cfg.net).unwrap()
    }

    #[test]
    fn test_screener_url_uses_upstream_keys() {
        let cfg = AppConfig::default();
        let s = OpenInsiderScraper::new(&cfg.screener, &cfg.net).unwrap();
        let url = s.screener_url(&query()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://openinsider.com/screener?s=ACME&o=&pl=&ph=&fd=7&td=0&nop=50"
        );
    }

    #[tokio::test]
    async fn test_fetch_rows_happy_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/screener")
                    .query_param("s", "ACME")
                    .query_param("fd", "7")
                    .query_param("nop", "50");
                then.status(200).header("content-type", "text/html").body(PAGE);
            })
            .await;

        let rows = scraper_for(&server).fetch_rows(&query()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Insider Name"), Some("Roe Jane"));
    }

    #[tokio::test]
    async fn test_bot_wall_is_structure_changed_and_extract_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/screener");
                then.status(200).body("<html>Checking your browser…</html>");
            })
            .await;

        let s = scraper_for(&server);
        let err = s.fetch_rows(&query()).await.unwrap_err();
        assert!(matches!(err, SourceError::StructureChanged { .. }));
        assert!(s.extract(&query()).await.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_extracts_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/screener");
                then.status(500);
            })
            .await;

        let s = scraper_for(&server);
        assert!(matches!(
            s.fetch_rows(&query()).await,
            Err(SourceError::Unavailable { .. })
        ));
        assert!(s.extract(&query()).await.is_empty());
    }
}
