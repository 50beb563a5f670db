use thiserror::Error;

/// A whole fetch failed. Callers turn this into an empty result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Transport error, timeout or non-success status.
    #[error("source unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    /// The response arrived but did not look the way we expect.
    #[error("structure changed ({context}); body starts with: {snippet}")]
    StructureChanged { context: String, snippet: String },
}

impl SourceError {
    pub fn unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn structure_changed(context: impl Into<String>, body: &str) -> Self {
        Self::StructureChanged {
            context: context.into(),
            snippet: crate::utils::snippet(body, 200),
        }
    }
}

/// A single row or transaction node could not be used.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("row has {found} cells, header has {expected}")]
    CellCountMismatch { expected: usize, found: usize },

    #[error("row has neither ticker nor insider name")]
    MissingIdentity,

    #[error("field {field} is not numeric: {source}")]
    Numeric {
        field: &'static str,
        #[source]
        source: FieldError,
    },
}

/// A single cell could not be normalised.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldError {
    #[error("empty value")]
    Empty,

    #[error("not a number: {0:?}")]
    Unparsable(String),
}

/// Rejected before any network call is made.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("lookback window must be at least 1 day, got {0}")]
    LookbackDays(i64),

    #[error("row cap must be at least 1, got {0}")]
    MaxRows(i64),

    #[error("minimum transaction value must be a finite number >= 0, got {0}")]
    MinTransactionValue(f64),

    #[error("minimum share quantity must be >= 0, got {0}")]
    MinShareQuantity(i64),

    #[error("filing limit must be at least 1, got {0}")]
    FilingLimit(usize),

    #[error("ticker must not be empty")]
    EmptyTicker,
}
