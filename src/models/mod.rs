use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// One table row keyed by the headers discovered at fetch time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, String)>,
    pub filing_reference: Option<String>,
}

impl RawRow {
    /// Pairs headers with cells. `None` when the counts differ.
    pub fn from_cells(headers: &[String], cells: Vec<String>) -> Option<Self> {
        if headers.len() != cells.len() {
            return None;
        }
        Some(Self {
            cells: headers.iter().cloned().zip(cells).collect(),
            filing_reference: None,
        })
    }

    pub fn with_reference(mut self, href: Option<String>) -> Self {
        self.filing_reference = href;
        self
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    /// Exact header match first, then case/whitespace-insensitive.
    pub fn get(&self, column: &str) -> Option<&str> {
        if let Some((_, v)) = self.cells.iter().find(|(k, _)| k == column) {
            return Some(v.as_str());
        }
        let wanted = fold_header(column);
        self.cells
            .iter()
            .find(|(k, _)| fold_header(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    /// First column matching any alias; exact matches beat substring matches.
    pub fn find(&self, aliases: &[&str]) -> Option<&str> {
        for alias in aliases {
            if let Some(v) = self.get(alias) {
                return Some(v);
            }
        }
        for alias in aliases {
            let wanted = fold_header(alias);
            if let Some((_, v)) = self.cells.iter().find(|(k, _)| fold_header(k).contains(&wanted)) {
                return Some(v.as_str());
            }
        }
        None
    }
}

/// Lowercase and collapse all whitespace (NBSP included) to single spaces.
pub fn fold_header(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ── Normalised transaction ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeType {
    Purchase,
    Sale,
    Other,
}

impl TradeType {
    /// "P" / "P - Purchase" → Purchase, "S - Sale+OE" → Sale, anything else → Other.
    pub fn from_code(raw: &str) -> Self {
        let code = raw
            .trim()
            .split(|c: char| c.is_whitespace() || c == '-')
            .next()
            .unwrap_or("");
        match code.to_ascii_uppercase().as_str() {
            "P" => TradeType::Purchase,
            "S" => TradeType::Sale,
            _ => TradeType::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TradeType::Purchase => "P - Purchase",
            TradeType::Sale => "S - Sale",
            TradeType::Other => "Other",
        }
    }

    /// Purchases are non-negative, sales non-positive, others keep their sign.
    pub fn sign_f64(self, v: f64) -> f64 {
        match self {
            TradeType::Purchase => v.abs(),
            TradeType::Sale => -v.abs(),
            TradeType::Other => v,
        }
    }

    /// Saturates at the i64 bounds instead of overflowing.
    pub fn sign_i64(self, v: i64) -> i64 {
        match self {
            TradeType::Purchase => v.saturating_abs(),
            TradeType::Sale => v.saturating_abs().saturating_neg(),
            TradeType::Other => v,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsiderTransaction {
    pub filing_date: Option<NaiveDate>,
    pub trade_date: Option<NaiveDate>,
    pub ticker: String,
    pub company_name: String,
    pub insider_name: String,
    pub insider_title: String,
    /// "Common Stock", "Stock Option", ...; empty when the source has no such column.
    pub security_title: String,
    pub trade_type: TradeType,
    pub price_per_share: Option<f64>,
    pub quantity: Option<i64>,
    pub total_value: Option<f64>,
    pub shares_owned_after: Option<i64>,
    pub filing_reference: Option<String>,
}

impl InsiderTransaction {
    /// True when every numeric needed for charts/aggregates is present.
    pub fn is_numeric(&self) -> bool {
        self.price_per_share.is_some() && self.quantity.is_some() && self.total_value.is_some()
    }
}

// ── EDGAR identifiers ─────────────────────────────────────────────────────────

/// SEC CIK, always ten digits, zero-padded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Accepts "320193", "0000320193" or " 320193\n". Rejects non-digits and >10 digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.trim();
        if digits.is_empty() || digits.len() > 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self(format!("{:0>10}", digits)))
    }

    pub fn from_number(n: u64) -> Option<Self> {
        Self::parse(&n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Archive paths use the CIK without padding.
    pub fn unpadded(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() { "0" } else { trimmed }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accession number with separators removed ("0001234567-24-000001" → "000123456724000001").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessionId(String);

impl AccessionId {
    pub fn parse(raw: &str) -> Option<Self> {
        let id: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilingDescriptor {
    pub entity_id: EntityId,
    pub accession: AccessionId,
    pub form_type: String,
    pub filed_date: Option<NaiveDate>,
    pub primary_document: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(headers: &[&str], cells: &[&str]) -> RawRow {
        let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        RawRow::from_cells(&headers, cells.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_raw_row_rejects_mismatched_cells() {
        let headers = vec!["A".to_string(), "B".to_string()];
        assert!(RawRow::from_cells(&headers, vec!["1".into()]).is_none());
        assert!(RawRow::from_cells(&headers, vec!["1".into(), "2".into(), "3".into()]).is_none());
    }

    #[test]
    fn test_raw_row_lookup_tolerates_nbsp_and_case() {
        let r = row(&["Filing\u{a0}Date", "Qty", "ΔOwn"], &["2024-05-10", "1,000", "+5%"]);
        assert_eq!(r.get("filing date"), Some("2024-05-10"));
        assert_eq!(r.find(&["Shares", "Qty"]), Some("1,000"));
        assert_eq!(r.find(&["Owned"]), None);
    }

    #[test]
    fn test_raw_row_find_prefers_exact_over_substring() {
        let r = row(&["Company Name", "Insider Name"], &["Acme Corp", "Jane Roe"]);
        assert_eq!(r.find(&["Insider Name"]), Some("Jane Roe"));
        assert_eq!(r.find(&["Company"]), Some("Acme Corp"));
    }

    #[test]
    fn test_trade_type_from_code() {
        assert_eq!(TradeType::from_code("P - Purchase"), TradeType::Purchase);
        assert_eq!(TradeType::from_code("S - Sale+OE"), TradeType::Sale);
        assert_eq!(TradeType::from_code("s"), TradeType::Sale);
        assert_eq!(TradeType::from_code("M - OptEx"), TradeType::Other);
        assert_eq!(TradeType::from_code("Other"), TradeType::Other);
        assert_eq!(TradeType::from_code(""), TradeType::Other);
    }

    #[test]
    fn test_sign_i64_saturates_at_bounds() {
        assert_eq!(TradeType::Purchase.sign_i64(i64::MIN), i64::MAX);
        assert_eq!(TradeType::Sale.sign_i64(i64::MIN), -i64::MAX);
        assert_eq!(TradeType::Sale.sign_i64(i64::MAX), -i64::MAX);
        assert_eq!(TradeType::Other.sign_i64(i64::MIN), i64::MIN);
        assert_eq!(TradeType::Sale.sign_i64(250), -250);
    }

    #[test]
    fn test_entity_id_padding() {
        assert_eq!(EntityId::parse("123456").unwrap().as_str(), "0000123456");
        assert_eq!(EntityId::parse("0000320193").unwrap().unpadded(), "320193");
        assert!(EntityId::parse("12a4").is_none());
        assert!(EntityId::parse("12345678901").is_none());
    }

    #[test]
    fn test_accession_strips_separators() {
        let acc = AccessionId::parse("0001234567-24-000001").unwrap();
        assert_eq!(acc.as_str(), "000123456724000001");
        assert!(AccessionId::parse("--").is_none());
    }
}
