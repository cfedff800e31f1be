//! Papers with Code (additional stage)
//!
//! Looks the paper up by title, then attaches up to three code repositories,
//! most starred first with official implementations moved to the front.

use super::encode;
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::matcher::{normalize, similarity};
use crate::merge::merge_candidate;
use crate::types::{is_empty_value, Draft, SourceAdapter, SourceRequest, ACCEPT_FIRST};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const NAME: &str = "pwc";

const API_URL: &str = "https://paperswithcode.com/api/v1";

/// Title similarity a search hit must exceed
const PAPER_THRESHOLD: f64 = 0.98;

/// Repositories kept per paper
const MAX_CODES: usize = 3;

/// Entry of `Draft::codes`, stored as its JSON text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRef {
    pub url: String,
    pub is_official: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchHit {
    paper: HitPaper,
    repository: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HitPaper {
    id: String,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RepositoryList {
    results: Vec<Repository>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Repository {
    url: String,
    is_official: bool,
    stars: u64,
}

/// Slug-style search query: `deep-residual-learning`
fn search_query(title: &str) -> String {
    title
        .replace("&amp;", "")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .replace('.', "")
}

/// Papers with Code adapter
pub struct PapersWithCodeAdapter;

impl PapersWithCodeAdapter {
    /// Id of the first search hit that matches the title and has code
    fn paper_id(draft: &Draft, body: &str) -> ScrapeResult<Option<String>> {
        let response: SearchResponse = serde_json::from_str(body)?;
        let target = normalize(&draft.title);
        Ok(response
            .results
            .into_iter()
            .find(|hit| {
                hit.repository.as_ref().is_some_and(|r| !r.is_null())
                    && similarity(&normalize(&hit.paper.title), &target) > PAPER_THRESHOLD
            })
            .map(|hit| hit.paper.id))
    }
}

#[async_trait]
impl SourceAdapter for PapersWithCodeAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.title)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(
            format!("{}/search/?q={}", API_URL, encode(&search_query(&draft.title))),
            ACCEPT_FIRST,
        )
        .header("Accept", "application/json"))
    }

    /// Decodes a repository listing into a codes-only candidate
    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let mut repositories: RepositoryList = serde_json::from_str(body)?;
        if repositories.results.is_empty() {
            return Ok(Vec::new());
        }
        repositories.results.sort_by(|a, b| b.stars.cmp(&a.stars));
        repositories.results.truncate(MAX_CODES);
        repositories.results.sort_by_key(|r| !r.is_official);

        let codes = repositories
            .results
            .into_iter()
            .map(|r| {
                serde_json::to_string(&CodeRef {
                    url: r.url,
                    is_official: r.is_official,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vec![Draft {
            codes,
            ..Default::default()
        }])
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        if !self.is_applicable(&draft) {
            return Ok(draft);
        }
        let search = self.build_request(&draft)?;
        let body = fetcher.fetch(&search).await?;
        let Some(id) = Self::paper_id(&draft, &body)? else {
            return Ok(draft);
        };

        debug!(source = NAME, paper_id = %id, "Fetching repositories");
        let listing = search.with_url(format!("{}/papers/{}/repositories/", API_URL, id));
        let body = fetcher.fetch(&listing).await?;
        Ok(self
            .parse_response(&body)?
            .first()
            .map(|candidate| merge_candidate(draft.clone(), candidate))
            .unwrap_or(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MapFetcher;

    const SEARCH: &str = r#"{"count":2,"results":[
        {"paper":{"id":"resnet-v2","title":"Identity Mappings in Deep Residual Networks"},"repository":{"url":"https://github.com/a/b"}},
        {"paper":{"id":"deep-residual-learning-for-image","title":"Deep Residual Learning for Image Recognition"},"repository":{"url":"https://github.com/kaiminghe/deep-residual-networks"},"is_official":true}
    ]}"#;

    const REPOS: &str = r#"{"count":4,"results":[
        {"url":"https://github.com/small/fork","is_official":false,"stars":3},
        {"url":"https://github.com/tensorflow/models","is_official":false,"stars":75000},
        {"url":"https://github.com/kaiminghe/deep-residual-networks","is_official":true,"stars":6000},
        {"url":"https://github.com/pytorch/vision","is_official":false,"stars":15000}
    ]}"#;

    fn code(json: &str) -> CodeRef {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_search_query_slug() {
        assert_eq!(
            search_query("  Attention Is All You Need v2.0 &amp; more "),
            "attention-is-all-you-need-v20-more"
        );
    }

    #[test]
    fn test_codes_ranked_and_official_first() {
        let candidates = PapersWithCodeAdapter.parse_response(REPOS).unwrap();
        let codes: Vec<CodeRef> = candidates[0].codes.iter().map(|c| code(c)).collect();
        assert_eq!(codes.len(), 3);
        assert_eq!(codes[0].url, "https://github.com/kaiminghe/deep-residual-networks");
        assert!(codes[0].is_official);
        assert_eq!(codes[1].url, "https://github.com/tensorflow/models");
        assert_eq!(codes[2].url, "https://github.com/pytorch/vision");
        assert_eq!(
            candidates[0].codes[0],
            r#"{"url":"https://github.com/kaiminghe/deep-residual-networks","isOfficial":true}"#
        );
    }

    #[tokio::test]
    async fn test_resolve_attaches_codes() {
        let fetcher = MapFetcher::new()
            .route("papers/deep-residual-learning-for-image/repositories", REPOS)
            .route("search/?q=", SEARCH);
        let draft = Draft::with_title("Deep Residual Learning for Image Recognition");

        let resolved = PapersWithCodeAdapter.resolve(draft, &fetcher).await.unwrap();
        assert_eq!(resolved.codes.len(), 3);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_no_matching_paper() {
        let fetcher = MapFetcher::new().route("search/?q=", SEARCH);
        let draft = Draft::with_title("Graph Attention Networks");
        let resolved = PapersWithCodeAdapter.resolve(draft.clone(), &fetcher).await.unwrap();
        assert_eq!(resolved, draft);
        assert_eq!(fetcher.request_count(), 1);
    }
}
