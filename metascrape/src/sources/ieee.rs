//! IEEE Xplore metadata API (clientside stage)
//!
//! Needs a personal API key; without one the adapter never applies.

use super::{encode, unescape_amp, Scalar};
use crate::error::{ScrapeError, ScrapeResult};
use crate::types::{is_empty_value, Draft, PubType, SourceAdapter, SourceRequest};
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "ieee";

const SEARCH_URL: &str = "http://ieeexploreapi.ieee.org/api/v1/search/articles";
const TITLE_THRESHOLD: f64 = 0.95;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    total_records: u64,
    articles: Vec<Article>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Article {
    title: String,
    authors: ArticleAuthors,
    publication_year: Option<Scalar>,
    content_type: String,
    publication_title: String,
    volume: Option<Scalar>,
    publisher: String,
    start_page: Option<Scalar>,
    end_page: Option<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArticleAuthors {
    authors: Vec<ArticleAuthor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArticleAuthor {
    full_name: String,
}

fn scalar(value: Option<Scalar>) -> String {
    value.map(|v| v.as_string()).unwrap_or_default()
}

impl Article {
    fn into_candidate(self) -> Draft {
        let pub_type = if self.content_type.contains("Journals") || self.content_type.contains("Article") {
            PubType::Journal
        } else if self.content_type.contains("Conferences") {
            PubType::Conference
        } else if self.content_type.contains("Book") {
            PubType::Book
        } else {
            PubType::Other
        };

        let start = scalar(self.start_page);
        let end = scalar(self.end_page);
        let pages = match (start.is_empty(), end.is_empty()) {
            (false, false) => format!("{}-{}", start, end),
            (false, true) => start,
            (true, false) => format!("-{}", end),
            (true, true) => String::new(),
        };

        Draft {
            title: unescape_amp(&self.title),
            authors: self
                .authors
                .authors
                .iter()
                .map(|a| a.full_name.trim())
                .collect::<Vec<_>>()
                .join(", "),
            publication: self.publication_title,
            pub_time: scalar(self.publication_year),
            pub_type: Some(pub_type),
            pages,
            volume: scalar(self.volume),
            publisher: self.publisher,
            ..Default::default()
        }
    }
}

/// IEEE Xplore adapter
pub struct IeeeAdapter {
    api_key: Option<String>,
}

impl IeeeAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !is_empty_value(key)),
        }
    }
}

#[async_trait]
impl SourceAdapter for IeeeAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        self.api_key.is_some() && !is_empty_value(&draft.title) && !draft.is_complete()
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ScrapeError::InvalidRequest("IEEE API key not configured".to_string()))?;
        let title = draft
            .title
            .split_whitespace()
            .map(encode)
            .collect::<Vec<_>>()
            .join("+");
        Ok(SourceRequest::get(
            format!(
                "{}?apikey={}&format=json&max_records=25&start_record=1&sort_order=asc&sort_field=article_number&article_title={}",
                SEARCH_URL,
                encode(key),
                title
            ),
            TITLE_THRESHOLD,
        )
        .header("Accept", "application/json"))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let response: SearchResponse = serde_json::from_str(body)?;
        if response.total_records == 0 {
            return Ok(Vec::new());
        }
        Ok(response.articles.into_iter().map(Article::into_candidate).collect())
    }
}
