//! Core types for metadata resolution
//!
//! Defines the draft record, the source adapter contract and the small value
//! types that flow between the stage runner, the matcher and the merger.

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::Fetcher;
use crate::matcher::match_candidates;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Draft
// ============================================================================

/// Publication type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PubType {
    Journal = 0,
    Conference = 1,
    Other = 2,
    Book = 3,
}

impl TryFrom<u8> for PubType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PubType::Journal),
            1 => Ok(PubType::Conference),
            2 => Ok(PubType::Other),
            3 => Ok(PubType::Book),
            other => Err(format!("Unknown pubType {}", other)),
        }
    }
}

impl From<PubType> for u8 {
    fn from(value: PubType) -> Self {
        value as u8
    }
}

/// Bibliographic record under resolution
///
/// Also used for candidates: a candidate is a freshly built `Draft` holding
/// only the fields one source reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Draft {
    pub title: String,
    /// Comma-joined display string (`"Ada Lovelace, Charles Babbage"`)
    pub authors: String,
    /// Venue name, or a `dblp://{"venueID":..,"paperKey":..}` placeholder
    pub publication: String,
    /// Publication year
    pub pub_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_type: Option<PubType>,
    pub doi: String,
    pub arxiv: String,
    pub pages: String,
    pub volume: String,
    pub number: String,
    pub publisher: String,
    /// Repository references, each a JSON string `{"url":..,"isOfficial":..}`
    pub codes: Vec<String>,
}

/// Mergeable draft fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Title,
    Authors,
    Publication,
    PubTime,
    PubType,
    Doi,
    Arxiv,
    Pages,
    Volume,
    Number,
    Publisher,
    Codes,
}

impl Field {
    /// Every field, in merge order
    pub const ALL: [Field; 12] = [
        Field::Title,
        Field::Authors,
        Field::Publication,
        Field::PubTime,
        Field::PubType,
        Field::Doi,
        Field::Arxiv,
        Field::Pages,
        Field::Volume,
        Field::Number,
        Field::Publisher,
        Field::Codes,
    ];

    /// JSON name of the field
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Authors => "authors",
            Field::Publication => "publication",
            Field::PubTime => "pubTime",
            Field::PubType => "pubType",
            Field::Doi => "doi",
            Field::Arxiv => "arxiv",
            Field::Pages => "pages",
            Field::Volume => "volume",
            Field::Number => "number",
            Field::Publisher => "publisher",
            Field::Codes => "codes",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue values that only say where a preprint lives
const PREPRINT_PLACEHOLDERS: [&str; 6] =
    ["arxiv", "corr", "biorxiv", "medrxiv", "chemrxiv", "openreview.net"];

/// Prefix of the structured DBLP venue reference
pub const DBLP_VENUE_PREFIX: &str = "dblp://";

/// True when a string field carries no information
///
/// Blank strings and the literals `"undefined"` / `"null"` count as empty.
pub fn is_empty_value(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == "undefined" || trimmed == "null"
}

impl Draft {
    /// Draft seeded with a title
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Title => Some(&self.title),
            Field::Authors => Some(&self.authors),
            Field::Publication => Some(&self.publication),
            Field::PubTime => Some(&self.pub_time),
            Field::Doi => Some(&self.doi),
            Field::Arxiv => Some(&self.arxiv),
            Field::Pages => Some(&self.pages),
            Field::Volume => Some(&self.volume),
            Field::Number => Some(&self.number),
            Field::Publisher => Some(&self.publisher),
            Field::PubType | Field::Codes => None,
        }
    }

    fn text_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Title => Some(&mut self.title),
            Field::Authors => Some(&mut self.authors),
            Field::Publication => Some(&mut self.publication),
            Field::PubTime => Some(&mut self.pub_time),
            Field::Doi => Some(&mut self.doi),
            Field::Arxiv => Some(&mut self.arxiv),
            Field::Pages => Some(&mut self.pages),
            Field::Volume => Some(&mut self.volume),
            Field::Number => Some(&mut self.number),
            Field::Publisher => Some(&mut self.publisher),
            Field::PubType | Field::Codes => None,
        }
    }

    /// True when `field` carries no information
    pub fn is_field_empty(&self, field: Field) -> bool {
        match field {
            Field::PubType => self.pub_type.is_none(),
            Field::Codes => self.codes.is_empty(),
            _ => self.text(field).map_or(true, is_empty_value),
        }
    }

    /// True when `field` holds the same value in both drafts
    pub fn field_eq(&self, other: &Draft, field: Field) -> bool {
        match field {
            Field::PubType => self.pub_type == other.pub_type,
            Field::Codes => self.codes == other.codes,
            _ => self.text(field) == other.text(field),
        }
    }

    /// Copy `field` from `source` into this draft
    pub fn copy_field(&mut self, source: &Draft, field: Field) {
        match field {
            Field::PubType => self.pub_type = source.pub_type,
            Field::Codes => self.codes = source.codes.clone(),
            _ => {
                if let (Some(target), Some(value)) = (self.text_mut(field), source.text(field)) {
                    *target = value.to_string();
                }
            }
        }
    }

    /// True when the publication is a `dblp://` venue reference
    pub fn has_venue_reference(&self) -> bool {
        self.publication.trim_start().starts_with(DBLP_VENUE_PREFIX)
    }

    /// True when the publication is a preprint-server placeholder (`arXiv`, `CoRR`, ...)
    pub fn has_preprint_publication(&self) -> bool {
        let venue = self.publication.trim().to_lowercase();
        PREPRINT_PLACEHOLDERS.contains(&venue.as_str())
    }

    /// True when the mandatory fields are populated with a real venue
    ///
    /// Mandatory fields are title, authors, pubTime and publication.
    pub fn is_complete(&self) -> bool {
        !self.is_field_empty(Field::Title)
            && !self.is_field_empty(Field::Authors)
            && !self.is_field_empty(Field::PubTime)
            && !self.is_field_empty(Field::Publication)
            && !self.has_venue_reference()
            && !self.has_preprint_publication()
    }
}

// ============================================================================
// Source adapter contract
// ============================================================================

/// Static per-adapter stage metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    /// Success of this adapter may end its stage once the draft is complete
    pub breakable: bool,
    /// Stage may not end early before this adapter finishes
    pub must_wait: bool,
}

impl SourceSpec {
    pub const fn new(breakable: bool, must_wait: bool) -> Self {
        Self {
            breakable,
            must_wait,
        }
    }
}

/// Trust the first candidate unconditionally
pub const ACCEPT_FIRST: f64 = -1.0;

/// One outbound request built by an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `-1` accept-first, `1` exact signature, otherwise fuzzy threshold
    pub similarity_threshold: f64,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl SourceRequest {
    /// GET request with the default 10 s timeout and one retry
    pub fn get(url: impl Into<String>, similarity_threshold: f64) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            similarity_threshold,
            timeout: Duration::from_secs(10),
            max_retries: 1,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Same request against a different URL
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }
}

/// Source adapter trait
///
/// One implementation per external metadata source. Adapters are stateless
/// values held in the `SourceRegistry`; each invocation receives a private
/// copy of the draft.
///
/// Single-request adapters implement `build_request` and `parse_response`
/// and inherit `resolve`. Multi-request flows override `resolve`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry name (`"doi"`, `"dblp"`, ...)
    fn name(&self) -> &'static str;

    /// True if the draft has enough seed fields for this source
    fn is_applicable(&self, draft: &Draft) -> bool;

    /// Build the request for this draft
    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest>;

    /// Decode a response body into candidates
    ///
    /// "No results" is an empty list, never an error.
    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>>;

    /// Resolve the draft against this source
    ///
    /// Returns the draft unchanged when the adapter is not applicable or no
    /// candidate qualifies. Fetch and decode failures are returned as errors.
    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        resolve_single(self, draft, fetcher).await
    }
}

/// Single request → parse → match flow
///
/// Adapters that override `resolve` call this for their plain path.
pub async fn resolve_single<A>(adapter: &A, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft>
where
    A: SourceAdapter + ?Sized,
{
    if !adapter.is_applicable(&draft) {
        return Ok(draft);
    }
    let request = adapter.build_request(&draft)?;
    let body = fetcher.fetch(&request).await?;
    let candidates = adapter.parse_response(&body)?;
    Ok(match_candidates(draft, candidates, request.similarity_threshold))
}

/// One adapter failure, attributed to its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

impl SourceFailure {
    pub fn new(source: impl Into<String>, error: &ScrapeError) -> Self {
        Self {
            source: source.into(),
            message: error.to_string(),
        }
    }
}
