//! Pipeline orchestrator: ties sources → cleaner → filters together.
//!
//! ## Run modes
//!
//! `run()` — screener mode:
//!   1. Fetch the OpenInsider screener table → RawRows
//!   2. Normalise each row into an InsiderTransaction (rows with no identity are set aside)
//!   3. Apply value / quantity floors, preserving source order
//!
//! `run_filings()` — EDGAR mode:
//!   1. Resolve ticker → CIK
//!   2. List recent filings of the requested form type
//!   3. Fetch + parse each filing document, at most `concurrency` at a time
//!
//! Neither mode retries. A failed source yields an empty report with a status,
//! never an error; only invalid configuration is an error.

use crate::edgar::EdgarClient;
use crate::error::{ConfigError, RowError, SourceError};
use crate::models::{EntityId, FilingDescriptor, InsiderTransaction, RawRow};
use crate::scraper::cleaner::clean_rows;
use crate::scraper::{ScreenerQuery, TransactionSource};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

// ── Per-run configuration ─────────────────────────────────────────────────────

/// Immutable per-invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub lookback_days: i64,
    pub ticker_filter: Option<String>,
    pub max_rows: i64,
    pub min_transaction_value: f64,
    pub min_share_quantity: i64,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<ScreenerQuery, ConfigError> {
        if self.lookback_days < 1 {
            return Err(ConfigError::LookbackDays(self.lookback_days));
        }
        if self.max_rows < 1 {
            return Err(ConfigError::MaxRows(self.max_rows));
        }
        self.filter()?;

        Ok(ScreenerQuery {
            ticker_filter: self
                .ticker_filter
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_uppercase),
            lookback_days: u32::try_from(self.lookback_days).unwrap_or(u32::MAX),
            max_rows: u32::try_from(self.max_rows).unwrap_or(u32::MAX),
        })
    }

    pub fn filter(&self) -> Result<TransactionFilter, ConfigError> {
        TransactionFilter::new(self.min_transaction_value, self.min_share_quantity)
    }
}

/// Inclusive floors on |total value| and |quantity|. A floor of zero is inactive;
/// an active floor excludes rows that lack the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionFilter {
    min_value: f64,
    min_quantity: i64,
}

impl TransactionFilter {
    pub fn new(min_value: f64, min_quantity: i64) -> Result<Self, ConfigError> {
        if !min_value.is_finite() || min_value < 0.0 {
            return Err(ConfigError::MinTransactionValue(min_value));
        }
        if min_quantity < 0 {
            return Err(ConfigError::MinShareQuantity(min_quantity));
        }
        Ok(Self {
            min_value,
            min_quantity,
        })
    }

    pub fn accepts(&self, t: &InsiderTransaction) -> bool {
        let value_ok = self.min_value <= 0.0
            || t.total_value.is_some_and(|v| v.abs() >= self.min_value);
        let qty_ok = self.min_quantity <= 0
            || t.quantity.is_some_and(|q| q.unsigned_abs() >= self.min_quantity.unsigned_abs());
        value_ok && qty_ok
    }

    pub fn apply(&self, txns: Vec<InsiderTransaction>) -> Vec<InsiderTransaction> {
        txns.into_iter().filter(|t| self.accepts(t)).collect()
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Why a report has the rows it has. Only `Ok` means the source answered normally.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Ok,
    Unavailable(String),
    StructureChanged(String),
}

impl From<&SourceError> for SourceStatus {
    fn from(e: &SourceError) -> Self {
        match e {
            SourceError::Unavailable { .. } => SourceStatus::Unavailable(e.to_string()),
            SourceError::StructureChanged { .. } => SourceStatus::StructureChanged(e.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct ScreenReport {
    pub status: SourceStatus,
    pub transactions: Vec<InsiderTransaction>,
    /// Rows kept for display only; they failed normalisation.
    pub rejected: Vec<(RawRow, RowError)>,
    pub fetched: usize,
}

impl ScreenReport {
    fn empty(status: SourceStatus) -> Self {
        Self {
            status,
            transactions: Vec::new(),
            rejected: Vec::new(),
            fetched: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilingsRequest {
    pub ticker: String,
    pub form_type: String,
    pub limit: usize,
    pub min_transaction_value: f64,
    pub min_share_quantity: i64,
}

#[derive(Debug)]
pub struct FilingsReport {
    pub status: SourceStatus,
    pub entity_id: Option<EntityId>,
    pub filings: Vec<FilingDescriptor>,
    pub transactions: Vec<InsiderTransaction>,
    pub errors: usize,
}

// ── Screener pipeline ─────────────────────────────────────────────────────────

pub struct Pipeline {
    source: Arc<dyn TransactionSource>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn TransactionSource>) -> Self {
        Self { source }
    }

    pub async fn run(&self, config: &PipelineConfig) -> Result<ScreenReport, ConfigError> {
        let query = config.validate()?;
        let filter = config.filter()?;

        let rows = match self.source.fetch_rows(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Screener returned no data: {}", e);
                return Ok(ScreenReport::empty(SourceStatus::from(&e)));
            }
        };

        let fetched = rows.len();
        let cleaned = clean_rows(rows);
        let normalised = cleaned.transactions.len();
        let transactions = filter.apply(cleaned.transactions);

        info!(
            "=== Screener: {} rows | {} normalised | {} rejected | {} after filters ===",
            fetched,
            normalised,
            cleaned.rejected.len(),
            transactions.len()
        );

        Ok(ScreenReport {
            status: SourceStatus::Ok,
            transactions,
            rejected: cleaned.rejected,
            fetched,
        })
    }
}

// ── EDGAR pipeline ────────────────────────────────────────────────────────────

pub struct FilingsPipeline {
    edgar: Arc<EdgarClient>,
    concurrency: usize,
}

impl FilingsPipeline {
    pub fn new(edgar: EdgarClient, concurrency: usize) -> Self {
        Self {
            edgar: Arc::new(edgar),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run_filings(&self, req: &FilingsRequest) -> Result<FilingsReport, ConfigError> {
        if req.ticker.trim().is_empty() {
            return Err(ConfigError::EmptyTicker);
        }
        if req.limit < 1 {
            return Err(ConfigError::FilingLimit(req.limit));
        }
        let filter = TransactionFilter::new(req.min_transaction_value, req.min_share_quantity)?;

        // ── 1. Ticker → CIK ───────────────────────────────────────────────────
        let Some(cik) = self.edgar.resolve_entity_id(&req.ticker).await else {
            return Ok(FilingsReport {
                status: SourceStatus::Unavailable(format!("no CIK for {}", req.ticker.to_uppercase())),
                entity_id: None,
                filings: Vec::new(),
                transactions: Vec::new(),
                errors: 0,
            });
        };

        // ── 2. Filing index ───────────────────────────────────────────────────
        let filings = self.edgar.list_filings(&cik, &req.form_type, req.limit).await;
        info!("=== {} ({}): parsing {} filings ===", req.ticker.to_uppercase(), cik, filings.len());

        // ── 3. Documents, bounded fan-out ─────────────────────────────────────
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for filing in &filings {
            let accession = filing.accession.clone();
            let filing = filing.clone();
            let cik = cik.clone();
            let edgar = Arc::clone(&self.edgar);
            let sem = Arc::clone(&sem);

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok()?;
                Some(edgar.parse(&cik, &filing).await)
            });
            handles.push((accession, handle));
        }

        let mut transactions = Vec::new();
        let mut errors = 0usize;
        for (accession, handle) in handles {
            match handle.await {
                Ok(Some(txns)) => transactions.extend(txns),
                Ok(None) => {
                    warn!("{}: semaphore closed", accession);
                    errors += 1;
                }
                Err(e) => {
                    error!("Task panic for {}: {}", accession, e);
                    errors += 1;
                }
            }
        }

        let before = transactions.len();
        let transactions = filter.apply(transactions);
        info!(
            "=== Done: {} filings | {} transactions | {} after filters | {} errors ===",
            filings.len(),
            before,
            transactions.len(),
            errors
        );

        let status = if filings.is_empty() {
            SourceStatus::Unavailable(format!("no form {} filings for {}", req.form_type, cik))
        } else {
            SourceStatus::Ok
        };

        Ok(FilingsReport {
            status,
            entity_id: Some(cik),
            filings,
            transactions,
            errors,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
