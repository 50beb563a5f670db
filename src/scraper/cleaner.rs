use crate::error::{FieldError, RowError};
use crate::models::{InsiderTransaction, RawRow, TradeType};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

// ── Field normalisers ─────────────────────────────────────────────────────────

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Strip decoration and return a plain signed decimal literal.
/// "$12,345.67" → "12345.67" | "-$1,000" → "-1000" | "(1,234)" → "-1234"
fn strip_numeric(raw: &str) -> Result<String, FieldError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(FieldError::Empty);
    }

    let (negated, body) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let (sign, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (!negated, rest),
        None => (negated, cleaned),
    };

    let valid = digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if !valid {
        return Err(FieldError::Unparsable(raw.trim().to_string()));
    }

    Ok(if sign { format!("-{}", digits) } else { digits.to_string() })
}

/// "$12,345.67" → 12345.67. "N/A", "-", "" → error.
pub fn normalize_currency(raw: &str) -> Result<f64, FieldError> {
    let literal = strip_numeric(raw)?;
    literal
        .parse::<f64>()
        .map_err(|_| FieldError::Unparsable(raw.trim().to_string()))
}

/// "1,000" → 1000, "-2,500" → -2500. Fractional shares round to the nearest whole share.
pub fn normalize_count(raw: &str) -> Result<i64, FieldError> {
    let literal = strip_numeric(raw)?;
    if let Ok(n) = literal.parse::<i64>() {
        return Ok(n);
    }
    let v: f64 = literal
        .parse()
        .map_err(|_| FieldError::Unparsable(raw.trim().to_string()))?;
    if !v.is_finite() || v.abs() >= i64::MAX as f64 {
        return Err(FieldError::Unparsable(raw.trim().to_string()));
    }
    Ok(v.round() as i64)
}

/// Dates: ISO, ISO date-time (OpenInsider filing dates), "Feb 20, 2024", US slashes, "20 Feb 2024".
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%m/%d/%Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // Form 4 sometimes carries a timezone suffix: "2024-05-08-05:00"
    s.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

fn normalise_text(s: Option<&str>) -> String {
    s.map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

// ── Column aliases ────────────────────────────────────────────────────────────

const FILING_DATE: &[&str] = &["Filing Date", "Filed"];
const TRADE_DATE: &[&str] = &["Trade Date", "Transaction Date"];
const TICKER: &[&str] = &["Ticker", "Symbol"];
const COMPANY: &[&str] = &["Company Name", "Company", "Issuer"];
const INSIDER: &[&str] = &["Insider Name", "Insider", "Reporting Owner"];
const TITLE: &[&str] = &["Title", "Relationship"];
const SECURITY: &[&str] = &["Security", "Security Title"];
const TRADE_TYPE: &[&str] = &["Trade Type", "Type", "Transaction Code"];
const PRICE: &[&str] = &["Price", "Price Per Share"];
const QUANTITY: &[&str] = &["Qty", "Shares", "Quantity"];
const OWNED: &[&str] = &["Owned", "Shares Owned After"];
const VALUE: &[&str] = &["Value", "Total Value"];
const REFERENCE: &[&str] = &["Filing Reference", "Link"];

/// Parse an optional numeric cell. Absent → Ok(None); present but bad → logged, Ok(None).
fn optional<T>(
    row: &RawRow,
    aliases: &[&str],
    field: &'static str,
    parse: fn(&str) -> Result<T, FieldError>,
) -> Option<T> {
    let raw = row.find(aliases)?;
    match parse(raw) {
        Ok(v) => Some(v),
        Err(FieldError::Empty) => None,
        Err(source) => {
            debug!("{}", RowError::Numeric { field, source });
            None
        }
    }
}

// ── RawRow → InsiderTransaction ───────────────────────────────────────────────

/// Project a dynamically-keyed row into the fixed transaction shape.
/// Each field is independent; only a row with no identity at all is rejected.
pub fn clean_row(row: &RawRow) -> Result<InsiderTransaction, RowError> {
    let ticker = normalise_symbol(row.find(TICKER).unwrap_or(""));
    let insider_name = normalise_text(row.find(INSIDER));
    if ticker.is_empty() && insider_name.is_empty() {
        return Err(RowError::MissingIdentity);
    }

    let trade_type = TradeType::from_code(row.find(TRADE_TYPE).unwrap_or(""));
    let price_per_share = optional(row, PRICE, "price", normalize_currency).map(f64::abs);
    let quantity = optional(row, QUANTITY, "quantity", normalize_count).map(|q| trade_type.sign_i64(q));
    let reported_value = optional(row, VALUE, "value", normalize_currency);

    let total_value = reported_value
        .or_else(|| match (quantity, price_per_share) {
            (Some(q), Some(p)) => Some(q as f64 * p),
            _ => None,
        })
        .map(|v| trade_type.sign_f64(v));

    let filing_reference = row
        .filing_reference
        .clone()
        .or_else(|| row.find(REFERENCE).map(str::trim).filter(|s| !s.is_empty()).map(String::from));

    Ok(InsiderTransaction {
        filing_date: row.find(FILING_DATE).and_then(parse_date),
        trade_date: row.find(TRADE_DATE).and_then(parse_date),
        ticker,
        company_name: normalise_text(row.find(COMPANY)),
        insider_name,
        insider_title: normalise_text(row.find(TITLE)),
        security_title: normalise_text(row.find(SECURITY)),
        trade_type,
        price_per_share,
        quantity,
        total_value,
        shares_owned_after: optional(row, OWNED, "owned", normalize_count).map(i64::saturating_abs),
        filing_reference,
    })
}

/// Rows sorted into usable transactions and rejected rows, both in source order.
#[derive(Debug, Default)]
pub struct CleanOutcome {
    pub transactions: Vec<InsiderTransaction>,
    pub rejected: Vec<(RawRow, RowError)>,
}

pub fn clean_rows(rows: Vec<RawRow>) -> CleanOutcome {
    let outcome = rows.into_iter().fold(CleanOutcome::default(), |mut acc, row| {
        match clean_row(&row) {
            Ok(txn) => acc.transactions.push(txn),
            Err(e) => acc.rejected.push((row, e)),
        }
        acc
    });

    if !outcome.rejected.is_empty() {
        warn!(
            "{} rows rejected during normalisation ({} kept)",
            outcome.rejected.len(),
            outcome.transactions.len()
        );
    }
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────
