//! arXiv export API (precise stage)

use super::collapse_whitespace;
use crate::error::ScrapeResult;
use crate::types::{is_empty_value, Draft, PubType, SourceAdapter, SourceRequest, ACCEPT_FIRST};
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "arxiv";

/// Atom feed returned by `export.arxiv.org/api/query`
#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    name: String,
}

/// arXiv id without the `arXiv:` prefix
fn bare_id(arxiv: &str) -> String {
    let trimmed = arxiv.trim();
    trimmed
        .strip_prefix("arXiv:")
        .or_else(|| trimmed.strip_prefix("arxiv:"))
        .unwrap_or(trimmed)
        .to_string()
}

/// arXiv adapter
pub struct ArxivAdapter;

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.arxiv)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(
            format!(
                "https://export.arxiv.org/api/query?id_list={}",
                super::encode(&bare_id(&draft.arxiv))
            ),
            ACCEPT_FIRST,
        ))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let feed: Feed = quick_xml::de::from_str(body)?;
        Ok(feed
            .entries
            .into_iter()
            // Unknown ids produce a single entry titled "Error" without an abs link
            .filter(|entry| entry.id.contains("/abs/"))
            .map(|entry| Draft {
                title: collapse_whitespace(&entry.title),
                authors: entry
                    .authors
                    .iter()
                    .map(|a| a.name.trim().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                pub_time: entry.published.chars().take(4).collect(),
                pub_type: Some(PubType::Journal),
                publication: "arXiv".to_string(),
                ..Default::default()
            })
            .collect())
    }
}
