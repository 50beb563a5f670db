use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub net: NetConfig,
    pub screener: ScreenerConfig,
    pub edgar: EdgarConfig,
    pub pipeline: PipelineSettings,
}

/// Shared HTTP politeness settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Extra attempts on 429/503 only.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Cap on simultaneous outstanding requests per client.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

/// OpenInsider screener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScreenerConfig {
    #[serde(default = "default_screener_url")]
    pub base_url: String,

    #[serde(default = "default_browser_agent")]
    pub user_agent: String,

    /// Text that must appear in a genuine page; its absence means a bot wall.
    #[serde(default = "default_site_marker")]
    pub site_marker: String,

    #[serde(default = "default_table_class")]
    pub table_class: String,
}

/// SEC EDGAR endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgarConfig {
    #[serde(default = "default_ticker_map_url")]
    pub ticker_map_url: String,

    #[serde(default = "default_submissions_base")]
    pub submissions_base: String,

    #[serde(default = "default_archives_base")]
    pub archives_base: String,

    /// SEC asks for a contact address in the User-Agent.
    #[serde(default = "default_edgar_agent")]
    pub user_agent: String,
}

/// Defaults for per-run pipeline values; CLI flags override them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    #[serde(default = "default_max_rows")]
    pub max_rows: i64,

    #[serde(default)]
    pub min_transaction_value: f64,

    #[serde(default)]
    pub min_share_quantity: i64,

    #[serde(default = "default_form_type")]
    pub form_type: String,

    #[serde(default = "default_filing_limit")]
    pub filing_limit: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    10
}
fn default_request_delay_ms() -> u64 {
    150
}
fn default_jitter_ms() -> u64 {
    100
}
fn default_max_retries() -> usize {
    2
}
fn default_max_in_flight() -> usize {
    4
}
fn default_screener_url() -> String {
    "https://openinsider.com/screener".to_string()
}
fn default_browser_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}
fn default_site_marker() -> String {
    "openinsider".to_string()
}
fn default_table_class() -> String {
    "tinytable".to_string()
}
fn default_ticker_map_url() -> String {
    "https://www.sec.gov/include/ticker.txt".to_string()
}
fn default_submissions_base() -> String {
    "https://data.sec.gov/submissions".to_string()
}
fn default_archives_base() -> String {
    "https://www.sec.gov/Archives/edgar/data".to_string()
}
fn default_edgar_agent() -> String {
    "insider-tracker/0.1 (contact@example.com)".to_string()
}
fn default_concurrency() -> usize {
    3
}
fn default_lookback_days() -> i64 {
    5
}
fn default_max_rows() -> i64 {
    200
}
fn default_form_type() -> String {
    "4".to_string()
}
fn default_filing_limit() -> usize {
    10
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: default_screener_url(),
            user_agent: default_browser_agent(),
            site_marker: default_site_marker(),
            table_class: default_table_class(),
        }
    }
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            ticker_map_url: default_ticker_map_url(),
            submissions_base: default_submissions_base(),
            archives_base: default_archives_base(),
            user_agent: default_edgar_agent(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            lookback_days: default_lookback_days(),
            max_rows: default_max_rows(),
            min_transaction_value: 0.0,
            min_share_quantity: 0,
            form_type: default_form_type(),
            filing_limit: default_filing_limit(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("INSIDER").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize().context("Invalid configuration")
    }

    /// Settings suitable for tests against a local mock server.
    #[cfg(test)]
    pub fn for_mock(base: &str) -> Self {
        let mut cfg = Self::default();
        cfg.net.request_delay_ms = 0;
        cfg.net.jitter_ms = 0;
        cfg.net.timeout_secs = 5;
        cfg.screener.base_url = format!("{}/screener", base);
        cfg.edgar.ticker_map_url = format!("{}/include/ticker.txt", base);
        cfg.edgar.submissions_base = format!("{}/submissions", base);
        cfg.edgar.archives_base = format!("{}/Archives/edgar/data", base);
        cfg
    }
}
