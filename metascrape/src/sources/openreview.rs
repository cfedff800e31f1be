//! OpenReview notes search (fuzzy stage)

use super::bibtex;
use super::dblp_venue::{resolve_venue, VenueRef, WorkshopNaming};
use super::{encode, unescape_amp};
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::types::{is_empty_value, resolve_single, Draft, SourceAdapter, SourceRequest};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const NAME: &str = "openreview";

const TITLE_THRESHOLD: f64 = 0.95;

/// Publication of notes that were never accepted anywhere
const FORUM_PUBLICATION: &str = "openreview.net";

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("valid year regex"));
static BIBTEX_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"year=\{(\d{4})").expect("valid bibtex year regex"));

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    notes: Vec<Note>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Note {
    content: NoteContent,
}

/// API v2 wraps every content field in `{"value": ..}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Content<T> {
    Wrapped { value: T },
    Plain(T),
}

impl<T> Content<T> {
    fn into_inner(self) -> T {
        match self {
            Content::Wrapped { value } => value,
            Content::Plain(value) => value,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteContent {
    title: Option<Content<String>>,
    authors: Option<Content<Vec<String>>>,
    venue: Option<Content<String>>,
    venueid: Option<Content<String>>,
    #[serde(rename = "_bibtex")]
    bibtex: Option<Content<String>>,
}

fn text(value: Option<Content<String>>) -> String {
    value.map(Content::into_inner).unwrap_or_default()
}

/// Publication for a `venueid` that points at a DBLP venue
///
/// `dblp.org/conf/ICLR/2015` → `dblp://{"venueID":"conf/iclr",...}`;
/// arXiv listings yield an empty publication.
fn dblp_publication(venueid: &str) -> Option<String> {
    let kind = if venueid.contains("conf") { "conf" } else { "journals" };
    let segment = venueid.split('/').nth(2)?;
    let venue_id = format!("{}/{}", kind, segment.to_lowercase());
    if venue_id.contains("journals/corr") {
        return Some(String::new());
    }
    Some(VenueRef::new(venue_id, "").to_publication())
}

impl NoteContent {
    fn into_candidate(self) -> Draft {
        let mut candidate = Draft {
            title: unescape_amp(&text(self.title)),
            authors: self
                .authors
                .map(Content::into_inner)
                .unwrap_or_default()
                .join(", "),
            ..Default::default()
        };
        let venue = text(self.venue);
        let venueid = text(self.venueid);
        let bib = text(self.bibtex);

        if venue.is_empty() {
            if let Some(year) = BIBTEX_YEAR.captures(&bib).and_then(|c| c.get(1)) {
                candidate.pub_time = year.as_str().to_string();
            }
            candidate.publication = FORUM_PUBLICATION.to_string();
            return candidate;
        }
        if venue.contains("Submitted") || venue.contains("CoRR") {
            return candidate;
        }

        if venue.to_lowercase().contains("accept") {
            if let Some(record) = bibtex::parse_first(&bib) {
                candidate.publication = record.container_title;
                candidate.pub_time = record.year;
                candidate.pub_type = record.pub_type;
            }
            return candidate;
        }

        candidate.publication = if venueid.contains("dblp") {
            dblp_publication(&venueid).unwrap_or_else(|| venue.clone())
        } else {
            venue.clone()
        };
        let year_source = if venueid.is_empty() { &venue } else { &venueid };
        candidate.pub_time = YEAR
            .find(year_source)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        candidate
    }
}

/// OpenReview adapter
pub struct OpenReviewAdapter;

#[async_trait]
impl SourceAdapter for OpenReviewAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.title)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(
            format!(
                "https://api.openreview.net/notes/search?content=all&group=all&limit=10&source=forum&term={}&type=terms",
                encode(&draft.title)
            ),
            TITLE_THRESHOLD,
        )
        .header("Accept", "application/json")
        .timeout(Duration::from_secs(5)))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let response: SearchResponse = serde_json::from_str(body)?;
        Ok(response
            .notes
            .into_iter()
            .map(|note| note.content.into_candidate())
            .collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        let matched = resolve_single(self, draft, fetcher).await?;
        if !matched.has_venue_reference() {
            return Ok(matched);
        }
        match resolve_venue(matched.clone(), fetcher, WorkshopNaming::Suffix).await {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                warn!(source = NAME, error = %e, "Venue lookup failed");
                Ok(matched)
            }
        }
    }
}
