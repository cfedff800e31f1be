//! DOI content negotiation (precise stage)
//!
//! Resolves `https://dx.doi.org/<doi>` with `Accept: application/json`,
//! which returns CSL-JSON from the registration agency.

use super::{collapse_whitespace, unescape_amp, CslDate, OneOrMany, Scalar};
use crate::error::ScrapeResult;
use crate::types::{is_empty_value, Draft, PubType, SourceAdapter, SourceRequest, ACCEPT_FIRST};
use async_trait::async_trait;
use serde::Deserialize;

pub const NAME: &str = "doi";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CslItem {
    title: Option<OneOrMany<String>>,
    subtitle: Vec<String>,
    author: Vec<CslAuthor>,
    #[serde(rename = "published-print")]
    published_print: Option<CslDate>,
    published: Option<CslDate>,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(rename = "container-title")]
    container_title: Option<OneOrMany<String>>,
    publisher: String,
    page: Option<Scalar>,
    volume: Option<Scalar>,
    issue: Option<Scalar>,
    institution: Vec<Institution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CslAuthor {
    given: String,
    family: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Institution {
    name: String,
}

fn author_name(author: &CslAuthor) -> String {
    if !author.name.is_empty() {
        author.name.trim().to_string()
    } else {
        format!("{} {}", author.given.trim(), author.family.trim())
            .trim()
            .to_string()
    }
}

/// Publication type from a CSL `type` value
fn pub_type(item_type: &str) -> PubType {
    match item_type {
        "proceedings-article" => PubType::Conference,
        "journal-article" => PubType::Journal,
        t if t.contains("book") || t.contains("monograph") => PubType::Book,
        _ => PubType::Other,
    }
}

/// DOI resolver adapter
pub struct DoiAdapter;

#[async_trait]
impl SourceAdapter for DoiAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.doi)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        let doi: String = draft.doi.chars().filter(|c| !c.is_whitespace()).collect();
        Ok(SourceRequest::get(format!("https://dx.doi.org/{}", doi), ACCEPT_FIRST)
            .header("Accept", "application/json"))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        // Landing pages come back as HTML when no CSL representation exists
        if body.trim_start().starts_with('<') {
            return Ok(Vec::new());
        }
        let item: CslItem = serde_json::from_str(body)?;

        let title_parts: Vec<String> = item
            .title
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .take(1)
            .chain(std::iter::once(item.subtitle.join(" ")))
            .filter(|t| !t.trim().is_empty())
            .collect();

        let pub_time = item
            .published_print
            .as_ref()
            .and_then(CslDate::year)
            .or_else(|| item.published.as_ref().and_then(CslDate::year))
            .unwrap_or_default();

        let mut publication = if item.item_type.contains("monograph") {
            unescape_amp(&item.publisher)
        } else {
            item.container_title
                .map(|t| unescape_amp(&t.into_vec().join(", ")))
                .unwrap_or_default()
        };
        if let Some(institution) = item.institution.first() {
            if institution.name == "medRxiv" || institution.name == "bioRxiv" {
                publication = institution.name.clone();
            }
        }

        let publisher = if item.publisher == "Institute of Electrical and Electronics Engineers (IEEE)" {
            "IEEE".to_string()
        } else {
            item.publisher.clone()
        };

        Ok(vec![Draft {
            title: unescape_amp(&collapse_whitespace(&title_parts.join(" - "))),
            authors: item.author.iter().map(author_name).collect::<Vec<_>>().join(", "),
            publication,
            pub_time,
            pub_type: Some(pub_type(&item.item_type)),
            pages: item.page.map(|p| p.as_string()).unwrap_or_default(),
            volume: item.volume.map(|v| v.as_string()).unwrap_or_default(),
            number: item.issue.map(|i| i.as_string()).unwrap_or_default(),
            publisher,
            ..Default::default()
        }])
    }
}
