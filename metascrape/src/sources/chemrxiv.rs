//! ChemRxiv public API (precise and fuzzy stages)
//!
//! One adapter type, two registrations: the precise variant looks an item up
//! by its ChemRxiv DOI, the fuzzy variant searches by title. A matched item
//! with a version of record switches the draft to the published DOI, which
//! is then resolved through the DOI adapter.

use super::doi::DoiAdapter;
use super::{collapse_whitespace, encode, unescape_amp};
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::types::{
    is_empty_value, resolve_single, Draft, SourceAdapter, SourceRequest, ACCEPT_FIRST,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const PRECISE_NAME: &str = "chemrxivprecise";
pub const FUZZY_NAME: &str = "chemrxivfuzzy";

/// User-facing name enabling both variants
pub const GROUP_NAME: &str = "chemrxiv";

const API_URL: &str = "https://chemrxiv.org/engage/chemrxiv/public-api/v1";
const TITLE_THRESHOLD: f64 = 0.95;
const PREPRINT_PUBLICATION: &str = "chemRxiv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Precise,
    Fuzzy,
}

/// `items?term=` answers `{"itemHits":[{"item":{..}}]}`, `items/doi/` a bare item
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemResponse {
    Hits {
        #[serde(rename = "itemHits")]
        item_hits: Vec<ItemHit>,
    },
    Single(Item),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemHit {
    Wrapped { item: Item },
    Bare(Item),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Item {
    doi: String,
    title: String,
    published_date: String,
    authors: Vec<ItemAuthor>,
    vor: Option<VersionOfRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ItemAuthor {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VersionOfRecord {
    vor_doi: String,
}

impl Item {
    fn into_candidate(self) -> Draft {
        let mut candidate = Draft {
            title: unescape_amp(&collapse_whitespace(&self.title)),
            authors: self
                .authors
                .iter()
                .map(|a| format!("{} {}", a.first_name, a.last_name).trim().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            pub_time: self.published_date.chars().take(4).collect(),
            ..Default::default()
        };
        match self.vor.filter(|vor| !is_empty_value(&vor.vor_doi)) {
            Some(vor) => candidate.doi = vor.vor_doi,
            None => candidate.publication = PREPRINT_PUBLICATION.to_string(),
        }
        candidate
    }
}

/// ChemRxiv adapter
pub struct ChemRxivAdapter {
    mode: Mode,
}

impl ChemRxivAdapter {
    /// Lookup by ChemRxiv DOI
    pub fn precise() -> Self {
        Self { mode: Mode::Precise }
    }

    /// Title search
    pub fn fuzzy() -> Self {
        Self { mode: Mode::Fuzzy }
    }
}

#[async_trait]
impl SourceAdapter for ChemRxivAdapter {
    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Precise => PRECISE_NAME,
            Mode::Fuzzy => FUZZY_NAME,
        }
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        match self.mode {
            Mode::Precise => draft.doi.to_lowercase().contains("chemrxiv"),
            Mode::Fuzzy => !is_empty_value(&draft.title),
        }
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        let request = match self.mode {
            Mode::Precise => SourceRequest::get(
                format!("{}/items/doi/{}", API_URL, draft.doi.trim()),
                ACCEPT_FIRST,
            ),
            Mode::Fuzzy => SourceRequest::get(
                format!("{}/items?term={}", API_URL, encode(&collapse_whitespace(&draft.title))),
                TITLE_THRESHOLD,
            ),
        };
        Ok(request.timeout(Duration::from_secs(5)))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let items = match serde_json::from_str::<ItemResponse>(body)? {
            ItemResponse::Hits { item_hits } => item_hits
                .into_iter()
                .map(|hit| match hit {
                    ItemHit::Wrapped { item } | ItemHit::Bare(item) => item,
                })
                .collect(),
            ItemResponse::Single(item) => vec![item],
        };
        Ok(items.into_iter().map(Item::into_candidate).collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        let matched = resolve_single(self, draft.clone(), fetcher).await?;
        if matched == draft {
            return Ok(matched);
        }
        match DoiAdapter.resolve(matched.clone(), fetcher).await {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                warn!(source = self.name(), error = %e, "DOI lookup failed");
                Ok(matched)
            }
        }
    }
}
