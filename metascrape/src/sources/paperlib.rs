//! Remote metadata aggregation service
//!
//! `api.paperlib.app` runs the same sources server-side and caches results.
//! It is queried once per draft before any local stage; the resolver merges
//! its answer and decides whether the local pipeline still has to run.

use super::{collapse_whitespace, encode};
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::types::{is_empty_value, Draft, SourceRequest, ACCEPT_FIRST};
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "paperlib";

const QUERY_URL: &str = "https://api.paperlib.app/metadata/query";

/// Server-side result cache, always requested first
const CACHE_SCRAPER: &str = "cache";

/// Aggregation service client
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperlibAggregator;

impl PaperlibAggregator {
    /// True when the draft has an identifier the service can search by
    pub fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.title) || !is_empty_value(&draft.arxiv) || !is_empty_value(&draft.doi)
    }

    /// Query for `draft`, asking the service to consult `scrapers`
    pub fn build_request(&self, draft: &Draft, scrapers: &[&str]) -> SourceRequest {
        let mut url = format!(
            "{}?scrapers={}",
            QUERY_URL,
            std::iter::once(CACHE_SCRAPER)
                .chain(scrapers.iter().copied())
                .collect::<Vec<_>>()
                .join(",")
        );

        let title = collapse_whitespace(&draft.title.replace("&amp;", ""));
        let params = [
            ("title", title.as_str()),
            ("arxiv", draft.arxiv.as_str()),
            ("doi", draft.doi.as_str()),
        ];
        for (key, value) in params {
            if !is_empty_value(value) {
                url.push_str(&format!("&{}={}", key, encode(value.trim())));
            }
        }

        SourceRequest::get(url, ACCEPT_FIRST)
            .timeout(Duration::from_secs(15))
            .max_retries(1)
    }

    /// Decode the service's record
    ///
    /// `null` members are treated as absent.
    pub fn parse_response(&self, body: &str) -> ScrapeResult<Draft> {
        let mut value: serde_json::Value = serde_json::from_str(body)?;
        if let Some(object) = value.as_object_mut() {
            object.retain(|_, v| !v.is_null());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch and decode the aggregated record
    pub async fn query(
        &self,
        draft: &Draft,
        scrapers: &[&str],
        fetcher: &dyn Fetcher,
    ) -> ScrapeResult<Draft> {
        let request = self.build_request(draft, scrapers);
        debug!(source = NAME, url = %request.url, "Querying aggregation service");
        let body = fetcher.fetch(&request).await?;
        self.parse_response(&body)
    }
}
