//! CSV export of the final table, and CSV read-back as a RawRow source.

use crate::models::{InsiderTransaction, RawRow};
use anyhow::{Context, Result};
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Column order mirrors `InsiderTransaction` field order.
pub const HEADERS: [&str; 13] = [
    "Filing Date",
    "Trade Date",
    "Ticker",
    "Company Name",
    "Insider Name",
    "Title",
    "Security",
    "Trade Type",
    "Price",
    "Qty",
    "Value",
    "Owned",
    "Filing Reference",
];

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn record(t: &InsiderTransaction) -> [String; 13] {
    [
        opt(t.filing_date),
        opt(t.trade_date),
        t.ticker.clone(),
        t.company_name.clone(),
        t.insider_name.clone(),
        t.insider_title.clone(),
        t.security_title.clone(),
        t.trade_type.label().to_string(),
        opt(t.price_per_share),
        opt(t.quantity),
        opt(t.total_value),
        opt(t.shares_owned_after),
        t.filing_reference.clone().unwrap_or_default(),
    ]
}

/// Header row first, then one line per transaction. Quoting is standard CSV.
pub fn write_csv<W: Write>(txns: &[InsiderTransaction], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADERS).context("CSV header write failed")?;
    for t in txns {
        writer
            .write_record(record(t))
            .with_context(|| format!("CSV write failed for {} / {}", t.ticker, t.insider_name))?;
    }
    writer.flush().context("CSV flush failed")?;
    Ok(())
}

pub fn to_csv_string(txns: &[InsiderTransaction]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(txns, &mut buf)?;
    String::from_utf8(buf).context("CSV output was not UTF-8")
}

/// Read any headed CSV as RawRows. Rows whose width differs from the header are dropped.
pub fn read_csv_rows<R: Read>(input: R) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .headers()
        .context("CSV has no header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("CSV row {}: {}", i + 1, e);
                continue;
            }
        };
        let cells = record.iter().map(str::to_string).collect();
        match RawRow::from_cells(&headers, cells) {
            Some(row) => rows.push(row),
            None => debug!("CSV row {}: {} cells, header has {}", i + 1, record.len(), headers.len()),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeType;
    use crate::scraper::cleaner::clean_rows;
    use chrono::NaiveDate;

    fn txn(name: &str, trade_type: TradeType, price: Option<f64>, qty: Option<i64>) -> InsiderTransaction {
        InsiderTransaction {
            filing_date: NaiveDate::from_ymd_opt(2024, 5, 10),
            trade_date: None,
            ticker: "ACME".into(),
            company_name: "Acme, Inc.".into(),
            insider_name: name.into(),
            insider_title: "CEO, \"Chief\"".into(),
            security_title: "Common Stock".into(),
            trade_type,
            price_per_share: price,
            quantity: qty,
            total_value: price.zip(qty).map(|(p, q)| p * q as f64),
            shares_owned_after: Some(1_000_000),
            filing_reference: Some("https://www.sec.gov/x.xml".into()),
        }
    }

    #[test]
    fn test_header_first_and_quoting() {
        let csv = to_csv_string(&[txn("Roe Jane", TradeType::Purchase, Some(1.5), Some(10))]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Filing Date,Trade Date,Ticker,Company Name,Insider Name,Title,Security,Trade Type,Price,Qty,Value,Owned,Filing Reference"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2024-05-10,,ACME,\"Acme, Inc.\",Roe Jane,\"CEO, \"\"Chief\"\"\",Common Stock,P - Purchase,1.5,10,15,1000000,https://www.sec.gov/x.xml"
        );
    }

    #[test]
    fn test_round_trip_preserves_numbers() {
        let original = vec![
            txn("Roe Jane", TradeType::Sale, Some(12345.67), Some(-1200)),
            txn("Doe John", TradeType::Purchase, Some(0.25), Some(400)),
            txn("Poe Ann", TradeType::Other, None, Some(7)),
        ];
        let csv = to_csv_string(&original).unwrap();
        let rows = read_csv_rows(csv.as_bytes()).unwrap();
        let back = clean_rows(rows).transactions;

        assert_eq!(back.len(), original.len());
        for (a, b) in original.iter().zip(&back) {
            assert_eq!(a.price_per_share, b.price_per_share);
            assert_eq!(a.quantity, b.quantity);
            assert_eq!(a.total_value, b.total_value);
            assert_eq!(a.shares_owned_after, b.shares_owned_after);
            assert_eq!(a.trade_type, b.trade_type);
            assert_eq!(a.filing_date, b.filing_date);
            assert_eq!(a.filing_reference, b.filing_reference);
            assert_eq!(a.company_name, b.company_name);
            assert_eq!(a.security_title, b.security_title);
        }
    }

    #[test]
    fn test_value_and_owned_columns_are_not_swapped() {
        let mut t = txn("Roe Jane", TradeType::Purchase, Some(2.0), Some(10));
        t.shares_owned_after = Some(999_999);
        let csv = to_csv_string(&[t]).unwrap();

        let rows = read_csv_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].get("Value"), Some("20"));
        assert_eq!(rows[0].get("Owned"), Some("999999"));

        let back = clean_rows(rows).transactions;
        assert_eq!(back[0].total_value, Some(20.0));
        assert_eq!(back[0].shares_owned_after, Some(999_999));
    }

    #[test]
    fn test_read_drops_ragged_rows() {
        let csv = "Ticker,Qty\nACME,1\nBAD\nXYZ,2,extra\nFOO,3\n";
        let rows = read_csv_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("Ticker"), Some("FOO"));
    }
}
