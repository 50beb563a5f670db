//! SEC EDGAR: ticker → CIK, recent filings index, Form 4 documents.
//!
//! Every call is a single round trip. Failures are logged and come back as
//! `None` / empty so a caller never aborts because the regulator hiccupped.

pub mod parsers;

use crate::config::{EdgarConfig, NetConfig};
use crate::models::{EntityId, FilingDescriptor, InsiderTransaction};
use crate::scraper::http_client::HttpClient;
use anyhow::Result;
use tracing::{debug, info, warn};

use self::parsers::{lookup_ticker, parse_form4, parse_submissions, xml_document_name};

pub struct EdgarClient {
    client: HttpClient,
    config: EdgarConfig,
}

impl EdgarClient {
    pub fn new(config: &EdgarConfig, net: &NetConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(&config.user_agent, net)?,
            config: config.clone(),
        })
    }

    fn submissions_url(&self, entity: &EntityId) -> String {
        format!(
            "{}/CIK{}.json",
            self.config.submissions_base.trim_end_matches('/'),
            entity
        )
    }

    pub fn document_url(&self, filing: &FilingDescriptor) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.archives_base.trim_end_matches('/'),
            filing.entity_id.unpadded(),
            filing.accession,
            xml_document_name(filing)
        )
    }

    /// Exact, case-insensitive match against the published ticker map.
    pub async fn resolve_entity_id(&self, ticker: &str) -> Option<EntityId> {
        let body = match self.client.get_text(&self.config.ticker_map_url).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Ticker map fetch failed: {}", e);
                return None;
            }
        };

        let found = lookup_ticker(&body, ticker);
        match &found {
            Some(cik) => debug!("{} → CIK {}", ticker.to_uppercase(), cik),
            None => info!("{}: not in ticker map", ticker.to_uppercase()),
        }
        found
    }

    /// Recent filings of `form_type`, newest first, at most `limit`.
    pub async fn list_filings(
        &self,
        entity: &EntityId,
        form_type: &str,
        limit: usize,
    ) -> Vec<FilingDescriptor> {
        let url = self.submissions_url(entity);
        let body = match self.client.get_text(&url).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Filings index fetch failed: {}", e);
                return Vec::new();
            }
        };

        match parse_submissions(&body, entity, form_type, limit) {
            Ok(filings) => {
                info!("{}: {} form {} filings", entity, filings.len(), form_type);
                filings
            }
            Err(e) => {
                warn!(
                    "{}: submissions index undecodable ({}); body starts with: {}",
                    entity,
                    e,
                    crate::utils::snippet(&body, 200)
                );
                Vec::new()
            }
        }
    }

    /// Transactions reported in one filing; empty on fetch or XML failure.
    pub async fn parse(&self, entity: &EntityId, filing: &FilingDescriptor) -> Vec<InsiderTransaction> {
        if &filing.entity_id != entity {
            debug!("Filing {} listed under {}, fetching as {}", filing.accession, filing.entity_id, entity);
        }
        let filing = FilingDescriptor {
            entity_id: entity.clone(),
            ..filing.clone()
        };
        let url = self.document_url(&filing);

        let xml = match self.client.get_text(&url).await {
            Ok(x) => x,
            Err(e) => {
                warn!("Filing document fetch failed: {}", e);
                return Vec::new();
            }
        };

        match parse_form4(&xml, &filing, &url) {
            Ok(txns) => txns,
            Err(e) => {
                warn!("{}: malformed XML ({})", url, e);
                Vec::new()
            }
        }
    }
}
