use crate::models::{RawRow, fold_header};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use tracing::{debug, warn};
use url::Url;

// ── Table discovery strategies ────────────────────────────────────────────────

/// One way of locating the data table. Tried in priority order; first hit wins.
#[derive(Debug, Clone, PartialEq)]
pub enum TableMatcher {
    /// `<table class="...">`
    ByClass(String),
    /// Header row contains every keyword (case/whitespace-insensitive substring).
    ByHeaderKeywords(Vec<String>),
    /// Any table at all.
    FirstTable,
}

impl TableMatcher {
    /// The screener's usual layout first, then structural fallbacks.
    pub fn default_chain(table_class: &str) -> Vec<TableMatcher> {
        vec![
            TableMatcher::ByClass(table_class.to_string()),
            TableMatcher::ByHeaderKeywords(vec!["Filing Date".into(), "Trade Date".into()]),
            TableMatcher::FirstTable,
        ]
    }

    pub fn find<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        let tables = selector("table")?;
        match self {
            TableMatcher::ByClass(class) => doc
                .select(&tables)
                .find(|t| t.value().classes().any(|c| c.eq_ignore_ascii_case(class))),
            TableMatcher::ByHeaderKeywords(keywords) => {
                let wanted: Vec<String> = keywords.iter().map(|k| fold_header(k)).collect();
                doc.select(&tables).find(|t| {
                    let headers = header_cells(*t).join("|");
                    let headers = fold_header(&headers);
                    wanted.iter().all(|k| headers.contains(k.as_str()))
                })
            }
            TableMatcher::FirstTable => doc.select(&tables).next(),
        }
    }
}

impl fmt::Display for TableMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableMatcher::ByClass(c) => write!(f, "class={}", c),
            TableMatcher::ByHeaderKeywords(k) => write!(f, "headers~{}", k.join("+")),
            TableMatcher::FirstTable => f.write_str("first-table"),
        }
    }
}

// ── Table → RawRows ───────────────────────────────────────────────────────────

/// No matcher located a table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoTable;

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Non-empty header texts in upstream order.
fn header_cells(table: ElementRef<'_>) -> Vec<String> {
    let Some(th) = selector("th") else { return vec![] };
    table
        .select(&th)
        .map(cell_text)
        .filter(|h| !h.is_empty())
        .collect()
}

/// Parse the screener page into rows keyed by the live header row.
/// Rows whose cell count differs from the header are dropped, never padded.
pub fn parse_screener_table(
    html: &str,
    matchers: &[TableMatcher],
    page_url: Option<&Url>,
) -> Result<Vec<RawRow>, NoTable> {
    let doc = Html::parse_document(html);

    let Some((matcher, table)) = matchers
        .iter()
        .find_map(|m| m.find(&doc).map(|t| (m, t)))
    else {
        return Err(NoTable);
    };
    debug!("Data table located via {}", matcher);

    let headers = header_cells(table);
    if headers.is_empty() {
        warn!("Table found via {} has no header cells", matcher);
        return Ok(vec![]);
    }

    let (Some(tr_sel), Some(td_sel), Some(a_sel)) = (selector("tr"), selector("td"), selector("a[href]"))
    else {
        return Ok(vec![]);
    };

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for tr in table.select(&tr_sel) {
        let tds: Vec<ElementRef<'_>> = tr.select(&td_sel).collect();
        if tds.is_empty() {
            continue; // header row
        }

        let href = tds
            .first()
            .and_then(|td| td.select(&a_sel).next())
            .and_then(|a| a.value().attr("href"))
            .map(|h| resolve_href(h, page_url));

        let cells = tds.into_iter().map(cell_text).collect();
        match RawRow::from_cells(&headers, cells) {
            Some(row) => rows.push(row.with_reference(href)),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("Dropped {} rows with a cell count other than {}", dropped, headers.len());
    }
    Ok(rows)
}

fn resolve_href(href: &str, base: Option<&Url>) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><head><title>OpenInsider - Screener</title></head><body>
      <table class="nav"><tr><td>menu</td></tr></table>
      <table class="tinytable">
        <thead><tr>
          <th>X</th><th>Filing&nbsp;Date</th><th>Trade&nbsp;Date</th><th>Ticker</th>
          <th>Insider&nbsp;Name</th><th>Trade&nbsp;Type</th><th>Price</th><th>Qty</th><th>Value</th>
        </tr></thead>
        <tbody>
          <tr><td><a href="http://www.sec.gov/Archives/edgar/data/1/x.xml">M</a></td>
              <td>2024-05-10 16:32:11</td><td>2024-05-08</td><td><a href="/ACME">ACME</a></td>
              <td>Roe Jane</td><td>S - Sale</td><td>$12.50</td><td>-1,000</td><td>-$12,500</td></tr>
          <tr><td></td><td>2024-05-09 10:00:00</td><td>2024-05-07</td><td>XYZ</td>
              <td>Doe John</td><td>P - Purchase</td><td>$3.00</td><td>+500</td></tr>
          <tr><td>D</td><td>2024-05-09 09:00:00</td><td>2024-05-06</td><td>FOO</td>
              <td>Poe Ann</td><td>P - Purchase</td><td>$1.00</td><td>+100</td><td>+$100</td></tr>
        </tbody>
      </table>
    </body></html>"#;

    fn chain() -> Vec<TableMatcher> {
        TableMatcher::default_chain("tinytable")
    }

    #[test]
    fn test_rows_keyed_by_discovered_headers() {
        let rows = parse_screener_table(PAGE, &chain(), None).unwrap();

        // The 8-cell row is dropped
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Filing Date"), Some("2024-05-10 16:32:11"));
        assert_eq!(rows[0].get("Ticker"), Some("ACME"));
        assert_eq!(rows[1].get("Ticker"), Some("FOO"));
        assert_eq!(
            rows[0].filing_reference.as_deref(),
            Some("http://www.sec.gov/Archives/edgar/data/1/x.xml")
        );
        assert_eq!(rows[1].filing_reference, None);
    }

    #[test]
    fn test_output_len_equals_matching_rows() {
        let headers = "<tr><th>A</th><th>B</th><th>C</th></tr>";
        let body = [3, 2, 3, 4, 3, 1]
            .iter()
            .map(|n| format!("<tr>{}</tr>", "<td>v</td>".repeat(*n)))
            .collect::<String>();
        let html = format!("<table class=\"tinytable\">{}{}</table>", headers, body);

        let rows = parse_screener_table(&html, &chain(), None).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 3));
    }

    #[test]
    fn test_header_keyword_fallback_when_class_renamed() {
        let html = PAGE.replace("tinytable", "tinytable-v2");
        let matchers = vec![
            TableMatcher::ByClass("tinytable".into()),
            TableMatcher::ByHeaderKeywords(vec!["Filing Date".into(), "Trade Date".into()]),
        ];
        let rows = parse_screener_table(&html, &matchers, None).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_first_table_fallback() {
        let html = "<table><tr><th>Ticker</th><th>Qty</th></tr><tr><td>ACME</td><td>5</td></tr></table>";
        let rows = parse_screener_table(html, &chain(), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Qty"), Some("5"));
    }

    #[test]
    fn test_no_table_is_error_and_no_matching_rows_is_empty() {
        assert_eq!(parse_screener_table("<p>nothing</p>", &chain(), None), Err(NoTable));

        let html = "<table class=\"tinytable\"><tr><th>A</th><th>B</th></tr><tr><td>1</td></tr></table>";
        assert_eq!(parse_screener_table(html, &chain(), None), Ok(vec![]));
    }

    #[test]
    fn test_empty_header_cells_are_skipped() {
        let html = "<table class=\"tinytable\"><tr><th> </th><th>Ticker</th><th>Qty</th></tr>\
                    <tr><td>ACME</td><td>7</td></tr></table>";
        let rows = parse_screener_table(html, &chain(), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["Ticker", "Qty"]);
    }

    #[test]
    fn test_relative_reference_resolved_against_page() {
        let html = "<table class=\"tinytable\"><tr><th>Filing Date</th></tr>\
                    <tr><td><a href=\"/filing/1\">2024-05-10</a></td></tr></table>";
        let base = Url::parse("https://openinsider.com/screener?s=ACME").unwrap();
        let rows = parse_screener_table(html, &chain(), Some(&base)).unwrap();
        assert_eq!(rows[0].filing_reference.as_deref(), Some("https://openinsider.com/filing/1"));
    }
}
