//! Semantic Scholar graph API (fuzzy stage)
//!
//! Matched papers that carry a DOI are enriched through the DOI resolver;
//! the longer of the two author lists is kept.

use super::doi::DoiAdapter;
use super::{collapse_whitespace, encode, Scalar};
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::types::{is_empty_value, resolve_single, Draft, PubType, SourceAdapter, SourceRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const NAME: &str = "semanticscholar";

const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "externalIds,authors,title,year,journal,publicationVenue";
const TITLE_THRESHOLD: f64 = 0.95;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    data: Vec<Paper>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Paper {
    title: String,
    year: Option<Scalar>,
    authors: Vec<PaperAuthor>,
    external_ids: Option<ExternalIds>,
    journal: Option<Journal>,
    publication_venue: Option<Venue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaperAuthor {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExternalIds {
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Journal {
    name: Option<String>,
    volume: Option<String>,
    pages: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Venue {
    name: String,
    #[serde(rename = "type")]
    venue_type: Option<String>,
}

impl Paper {
    fn into_candidate(self) -> Draft {
        let journal = self.journal.unwrap_or_default();
        let ids = self.external_ids.unwrap_or_default();

        let (publication, pub_type) = match self.publication_venue {
            Some(venue) => {
                let pub_type = match venue.venue_type.as_deref() {
                    Some("journal") => PubType::Journal,
                    Some("conference") => PubType::Conference,
                    Some("book") => PubType::Book,
                    _ => PubType::Other,
                };
                (venue.name, Some(pub_type))
            }
            None => (journal.name.clone().unwrap_or_default(), None),
        };

        Draft {
            title: collapse_whitespace(&self.title),
            authors: self
                .authors
                .iter()
                .map(|a| a.name.trim())
                .collect::<Vec<_>>()
                .join(", "),
            publication,
            pub_time: self.year.map(|y| y.as_string()).unwrap_or_default(),
            pub_type,
            doi: ids.doi.unwrap_or_default(),
            arxiv: ids.arxiv.unwrap_or_default(),
            volume: journal.volume.unwrap_or_default().trim().to_string(),
            pages: journal.pages.unwrap_or_default().trim().to_string(),
            ..Default::default()
        }
    }
}

fn author_count(authors: &str) -> usize {
    authors.split(',').filter(|a| !a.trim().is_empty()).count()
}

/// Semantic Scholar adapter
pub struct SemanticScholarAdapter;

#[async_trait]
impl SourceAdapter for SemanticScholarAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.title)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(
            format!(
                "{}?query={}&limit=10&fields={}",
                SEARCH_URL,
                encode(&collapse_whitespace(&draft.title)),
                FIELDS
            ),
            TITLE_THRESHOLD,
        )
        .timeout(Duration::from_secs(5)))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let response: SearchResponse = serde_json::from_str(body)?;
        Ok(response.data.into_iter().map(Paper::into_candidate).collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        let matched = resolve_single(self, draft.clone(), fetcher).await?;
        if matched == draft || is_empty_value(&matched.doi) {
            return Ok(matched);
        }

        match DoiAdapter.resolve(matched.clone(), fetcher).await {
            Ok(mut enriched) => {
                if author_count(&matched.authors) > author_count(&enriched.authors) {
                    enriched.authors = matched.authors;
                }
                Ok(enriched)
            }
            Err(e) => {
                warn!(source = NAME, error = %e, "DOI enrichment failed");
                Ok(matched)
            }
        }
    }
}
