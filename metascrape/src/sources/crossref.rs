//! Crossref (fuzzy stage)
//!
//! Three request shapes:
//! - DOI known: `api.crossref.org/works/<doi>`, first result trusted
//! - title and authors known: the XML query servlet returns a DOI, which is
//!   then looked up as above
//! - title only: bibliographic search, fuzzy matched at 0.95

use super::{collapse_whitespace, encode, unescape_amp, CslDate, Scalar};
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::matcher::match_candidates;
use crate::types::{
    is_empty_value, resolve_single, Draft, PubType, SourceAdapter, SourceRequest, ACCEPT_FIRST,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

pub const NAME: &str = "crossref";

const WORKS_URL: &str = "https://api.crossref.org/works";
const QUERY_SERVLET_URL: &str = "https://doi.crossref.org/servlet/query";
const MAILTO: &str = "hi@paperlib.app";
const TITLE_THRESHOLD: f64 = 0.95;

static DOI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+").expect("valid DOI regex"));

#[derive(Debug, Deserialize)]
struct Envelope {
    message: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkItem {
    title: Vec<String>,
    #[serde(rename = "DOI")]
    doi: String,
    publisher: String,
    #[serde(rename = "type")]
    item_type: String,
    page: String,
    author: Vec<WorkAuthor>,
    #[serde(rename = "container-title")]
    container_title: Vec<String>,
    #[serde(rename = "published-print")]
    published_print: Option<CslDate>,
    published: Option<CslDate>,
    issue: Option<Scalar>,
    volume: Option<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkAuthor {
    given: String,
    family: String,
}

impl WorkItem {
    fn into_candidate(self) -> Draft {
        let pub_type = if self.item_type.contains("journal") {
            PubType::Journal
        } else if self.item_type.contains("book") || self.item_type.contains("monograph") {
            PubType::Book
        } else if self.item_type.contains("proceedings") {
            PubType::Conference
        } else {
            PubType::Other
        };

        let publication = if self.item_type.contains("monograph") {
            self.publisher.clone()
        } else {
            self.container_title.join(", ")
        };

        let pub_time = self
            .published_print
            .as_ref()
            .and_then(CslDate::year)
            .or_else(|| self.published.as_ref().and_then(CslDate::year))
            .unwrap_or_default();

        Draft {
            title: unescape_amp(&collapse_whitespace(
                self.title.first().map(String::as_str).unwrap_or_default(),
            )),
            authors: self
                .author
                .iter()
                .map(|a| format!("{} {}", a.given, a.family).trim().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            publication: unescape_amp(&publication),
            pub_time,
            pub_type: Some(pub_type),
            doi: self.doi,
            pages: self.page,
            volume: self.volume.map(|v| v.as_string()).unwrap_or_default(),
            number: self.issue.map(|i| i.as_string()).unwrap_or_default(),
            publisher: self.publisher,
            ..Default::default()
        }
    }
}

fn doi_request(doi: &str) -> SourceRequest {
    SourceRequest::get(format!("{}/{}", WORKS_URL, encode(doi.trim())), ACCEPT_FIRST)
}

/// XML query asking the servlet for the DOI of a title/first-author pair
fn servlet_request(draft: &Draft) -> SourceRequest {
    let family = draft
        .authors
        .split(',')
        .next()
        .and_then(|first| first.split_whitespace().last())
        .unwrap_or_default();
    let qdata = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<query_batch xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" version="2.0" "#,
            r#"xmlns="http://www.crossref.org/qschema/2.0" "#,
            r#"xsi:schemaLocation="http://www.crossref.org/qschema/2.0 http://www.crossref.org/qschema/crossref_query_input2.0.xsd">"#,
            "<head><email_address>support@crossref.org</email_address><doi_batch_id>metascrape</doi_batch_id></head>",
            r#"<body><query enable-multiple-hits="false" secondary-query="author-title" key="key1">"#,
            r#"<article_title match="fuzzy">{}</article_title>"#,
            r#"<author search-all-authors="true">{}</author>"#,
            "</query></body></query_batch>"
        ),
        draft.title.replace('&', ""),
        family
    );
    SourceRequest::get(
        format!("{}?usr={}&qdata={}", QUERY_SERVLET_URL, MAILTO, encode(&qdata)),
        ACCEPT_FIRST,
    )
}

/// Crossref adapter
pub struct CrossrefAdapter;

#[async_trait]
impl SourceAdapter for CrossrefAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        (!is_empty_value(&draft.title) || !is_empty_value(&draft.doi))
            && !draft.doi.to_lowercase().contains("arxiv")
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        if !is_empty_value(&draft.doi) {
            return Ok(doi_request(&draft.doi));
        }
        Ok(SourceRequest::get(
            format!(
                "{}?query.bibliographic={}&rows=2&mailto={}",
                WORKS_URL,
                encode(&collapse_whitespace(&draft.title)),
                MAILTO
            ),
            TITLE_THRESHOLD,
        ))
    }

    /// Decodes both single-work and search responses
    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let envelope: Envelope = serde_json::from_str(body)?;
        let items: Vec<WorkItem> = match envelope.message.get("items") {
            Some(items) => serde_json::from_value(items.clone())?,
            None => vec![serde_json::from_value(envelope.message)?],
        };
        Ok(items.into_iter().map(WorkItem::into_candidate).collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        if !self.is_applicable(&draft)
            || !is_empty_value(&draft.doi)
            || is_empty_value(&draft.authors)
        {
            return resolve_single(self, draft, fetcher).await;
        }

        let body = fetcher.fetch(&servlet_request(&draft)).await?;
        let doi = body
            .rsplit('|')
            .next()
            .and_then(|tail| DOI_PATTERN.find(tail))
            .map(|m| m.as_str().to_string());

        match doi {
            Some(doi) => {
                debug!(source = NAME, doi = %doi, "Query servlet matched DOI");
                let request = doi_request(&doi);
                let body = fetcher.fetch(&request).await?;
                let candidates = self.parse_response(&body)?;
                Ok(match_candidates(draft, candidates, request.similarity_threshold))
            }
            None => Ok(draft),
        }
    }
}
