//! Pure parsers for the three SEC payloads: ticker map, submissions index, Form 4 XML.

use crate::error::RowError;
use crate::models::{AccessionId, EntityId, FilingDescriptor, InsiderTransaction, TradeType};
use crate::scraper::cleaner::{normalize_count, normalize_currency, parse_date};
use roxmltree::{Document, Node};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

// ── Ticker map ────────────────────────────────────────────────────────────────

/// Exact, case-insensitive lookup in either `ticker.txt` ("aapl\t320193" per line)
/// or `company_tickers.json` ({"0":{"cik_str":320193,"ticker":"AAPL",...}}).
pub fn lookup_ticker(body: &str, ticker: &str) -> Option<EntityId> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return None;
    }

    if body.trim_start().starts_with('{') {
        let map: Value = serde_json::from_str(body)
            .map_err(|e| warn!("Ticker map JSON undecodable: {}", e))
            .ok()?;
        return map.as_object()?.values().find_map(|entry| {
            let sym = entry.get("ticker")?.as_str()?;
            if !sym.eq_ignore_ascii_case(ticker) {
                return None;
            }
            match entry.get("cik_str")? {
                Value::Number(n) => EntityId::from_number(n.as_u64()?),
                Value::String(s) => EntityId::parse(s),
                _ => None,
            }
        });
    }

    body.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let (Some(sym), Some(cik), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        if sym.eq_ignore_ascii_case(ticker) { EntityId::parse(cik) } else { None }
    })
}

// ── Submissions index ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Submissions {
    #[serde(default)]
    filings: Filings,
}

#[derive(Debug, Default, Deserialize)]
struct Filings {
    #[serde(default)]
    recent: RecentFilings,
}

/// Parallel-indexed arrays, newest first.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
}

/// Filings of `form_type`, newest filed date first, at most `limit`.
pub fn parse_submissions(
    body: &str,
    entity: &EntityId,
    form_type: &str,
    limit: usize,
) -> Result<Vec<FilingDescriptor>, serde_json::Error> {
    let recent = serde_json::from_str::<Submissions>(body)?.filings.recent;

    let n = recent
        .accession_number
        .len()
        .min(recent.form.len())
        .min(recent.filing_date.len());
    if n < recent.form.len().max(recent.accession_number.len()) {
        debug!("{}: submissions arrays differ in length; using first {}", entity, n);
    }

    let mut filings: Vec<FilingDescriptor> = (0..n)
        .filter(|&i| recent.form[i].trim() == form_type.trim())
        .filter_map(|i| {
            Some(FilingDescriptor {
                entity_id: entity.clone(),
                accession: AccessionId::parse(&recent.accession_number[i])?,
                form_type: recent.form[i].trim().to_string(),
                filed_date: parse_date(&recent.filing_date[i]),
                primary_document: recent
                    .primary_document
                    .get(i)
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
            })
        })
        .collect();

    // Stable: ties keep index order
    filings.sort_by(|a, b| b.filed_date.cmp(&a.filed_date));
    filings.truncate(limit);
    Ok(filings)
}

/// The raw XML file behind a primary document. Rendered docs live under an
/// `xsl.../` prefix; the raw file has the same name one level up.
pub fn xml_document_name(filing: &FilingDescriptor) -> String {
    filing
        .primary_document
        .as_deref()
        .and_then(|d| d.rsplit('/').next())
        .filter(|name| name.to_ascii_lowercase().ends_with(".xml"))
        .unwrap_or("primary_doc.xml")
        .to_string()
}

// ── Form 4 XML ────────────────────────────────────────────────────────────────

/// First descendant named `path[0]`, then children down the rest of the path.
fn find<'a, 'i: 'a>(node: Node<'a, 'i>, path: &[&str]) -> Option<Node<'a, 'i>> {
    let (first, rest) = path.split_first()?;
    let mut cur = node
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == *first)?;
    for name in rest {
        cur = cur
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == *name)?;
    }
    Some(cur)
}

fn text(node: Node<'_, '_>, path: &[&str]) -> Option<String> {
    find(node, path)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

fn flag(node: Node<'_, '_>, path: &[&str]) -> bool {
    matches!(text(node, path).as_deref(), Some("1") | Some("true"))
}

/// Facts stated once per document.
#[derive(Debug, Clone)]
struct Reporter {
    name: String,
    title: String,
    ticker: String,
    company: String,
}

fn reporter(root: Node<'_, '_>) -> Reporter {
    let rel = find(root, &["reportingOwnerRelationship"]);
    let title = rel
        .and_then(|r| text(r, &["officerTitle"]))
        .or_else(|| rel.filter(|r| flag(*r, &["isDirector"])).map(|_| "Director".to_string()))
        .or_else(|| rel.filter(|r| flag(*r, &["isTenPercentOwner"])).map(|_| "10% Owner".to_string()))
        .or_else(|| rel.and_then(|r| text(r, &["otherText"])))
        .unwrap_or_default();

    Reporter {
        name: text(root, &["reportingOwnerId", "rptOwnerName"]).unwrap_or_else(|| "Unknown".to_string()),
        title,
        ticker: text(root, &["issuer", "issuerTradingSymbol"])
            .map(|s| s.to_uppercase())
            .unwrap_or_default(),
        company: text(root, &["issuer", "issuerName"]).unwrap_or_default(),
    }
}

fn parse_transaction(
    txn: Node<'_, '_>,
    who: &Reporter,
    filing: &FilingDescriptor,
    doc_url: &str,
) -> Result<InsiderTransaction, RowError> {
    let shares = text(txn, &["transactionAmounts", "transactionShares", "value"]).unwrap_or_else(|| "0".into());
    let price = text(txn, &["transactionAmounts", "transactionPricePerShare", "value"]).unwrap_or_else(|| "0".into());

    let shares = normalize_count(&shares).map_err(|source| RowError::Numeric { field: "shares", source })?;
    let price = normalize_currency(&price)
        .map_err(|source| RowError::Numeric { field: "price", source })?
        .abs();

    let trade_type = TradeType::from_code(&text(txn, &["transactionCoding", "transactionCode"]).unwrap_or_default());
    let disposed = text(txn, &["transactionAmounts", "transactionAcquiredDisposedCode", "value"])
        .is_some_and(|c| c.eq_ignore_ascii_case("D"));
    let magnitude = shares.saturating_abs();
    let quantity = trade_type.sign_i64(if disposed { -magnitude } else { magnitude });

    Ok(InsiderTransaction {
        filing_date: filing.filed_date,
        trade_date: text(txn, &["transactionDate", "value"]).as_deref().and_then(parse_date),
        ticker: who.ticker.clone(),
        company_name: who.company.clone(),
        insider_name: who.name.clone(),
        insider_title: who.title.clone(),
        security_title: text(txn, &["securityTitle", "value"]).unwrap_or_default(),
        trade_type,
        price_per_share: Some(price),
        quantity: Some(quantity),
        total_value: Some(trade_type.sign_f64(quantity as f64 * price)),
        shares_owned_after: text(txn, &["postTransactionAmounts", "sharesOwnedFollowingTransaction", "value"])
            .and_then(|v| normalize_count(&v).ok())
            .map(i64::saturating_abs),
        filing_reference: Some(doc_url.to_string()),
    })
}

/// Non-derivative then derivative transactions, in document order.
/// A transaction with non-numeric shares or price is skipped on its own.
pub fn parse_form4(
    xml: &str,
    filing: &FilingDescriptor,
    doc_url: &str,
) -> Result<Vec<InsiderTransaction>, roxmltree::Error> {
    let doc = Document::parse(xml.trim_start_matches('\u{feff}'))?;
    let root = doc.root_element();
    let who = reporter(root);

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for kind in ["nonDerivativeTransaction", "derivativeTransaction"] {
        for txn in root
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == kind)
        {
            match parse_transaction(txn, &who, filing, doc_url) {
                Ok(t) => out.push(t),
                Err(e) => {
                    debug!("{} {}: skipping {}: {}", filing.entity_id, filing.accession, kind, e);
                    skipped += 1;
                }
            }
        }
    }

    debug!(
        "{} {}: {} transactions for {} ({} skipped)",
        filing.entity_id,
        filing.accession,
        out.len(),
        who.name,
        skipped
    );
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
