//! DBLP publication search (fuzzy stage)
//!
//! Requests race `dblp.org` against the `dblp.uni-trier.de` mirror. Hits are
//! matched on the exact title signature; when nothing matches and the draft
//! carries a year, the search is retried scoped to that year and the one
//! before. A matched record's venue is stored as a `dblp://` reference and
//! resolved right away.

use super::dblp_venue::{resolve_venue, VenueRef, WorkshopNaming};
use super::{encode, unescape_amp, OneOrMany};
use crate::error::ScrapeResult;
use crate::fetch::{race_first_success, Fetcher};
use crate::matcher::{match_candidates, EXACT_MATCH_THRESHOLD};
use crate::types::{is_empty_value, Draft, PubType, SourceAdapter, SourceRequest};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

pub const NAME: &str = "dblp";

const HOSTS: [&str; 2] = ["https://dblp.org", "https://dblp.uni-trier.de"];

/// Years tried below the draft's year when the unscoped search misses
const YEAR_OFFSETS: [i32; 2] = [0, 1];

/// Race the same path against both DBLP hosts
pub(crate) async fn fetch_mirrored(fetcher: &dyn Fetcher, path: &str) -> ScrapeResult<String> {
    let requests: Vec<SourceRequest> = HOSTS
        .iter()
        .map(|host| SourceRequest::get(format!("{}{}", host, path), EXACT_MATCH_THRESHOLD))
        .collect();
    race_first_success(fetcher, &requests).await
}

/// `{"result":{"hits":{"hit":[{"info":..}]}}}` envelope shared by the search APIs
#[derive(Debug, Deserialize)]
pub(crate) struct DblpHits<T> {
    result: HitsResult<T>,
}

#[derive(Debug, Deserialize)]
struct HitsResult<T> {
    hits: Hits<T>,
}

#[derive(Debug, Deserialize)]
struct Hits<T> {
    #[serde(default = "OneOrMany::default")]
    hit: OneOrMany<Hit<T>>,
}

#[derive(Debug, Deserialize)]
struct Hit<T> {
    info: T,
}

impl<T> DblpHits<T> {
    pub(crate) fn into_infos(self) -> Vec<T> {
        self.result
            .hits
            .hit
            .into_vec()
            .into_iter()
            .map(|hit| hit.info)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublInfo {
    authors: Option<AuthorList>,
    title: String,
    venue: Option<OneOrMany<String>>,
    year: String,
    #[serde(rename = "type")]
    record_type: String,
    key: String,
    doi: String,
    volume: String,
    number: String,
    pages: String,
    publisher: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorList {
    author: OneOrMany<DblpAuthor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DblpAuthor {
    text: String,
}

impl PublInfo {
    fn venue(&self) -> String {
        self.venue
            .clone()
            .map(|v| v.into_vec().join(", "))
            .unwrap_or_default()
    }

    /// arXiv mirror records carry no venue information
    fn is_corr(&self) -> bool {
        self.key.starts_with("journals/corr") && self.venue() == "CoRR"
    }

    fn venue_ref(&self) -> VenueRef {
        let venue_id = if self.key.starts_with("journals/corr") {
            self.venue()
        } else {
            self.key.split('/').take(2).collect::<Vec<_>>().join("/")
        };
        VenueRef::new(venue_id, self.key.clone())
    }

    fn into_candidate(self) -> Draft {
        let pub_type = if self.record_type.contains("Journal") {
            PubType::Journal
        } else if self.record_type.contains("Conference") {
            PubType::Conference
        } else if self.record_type.contains("Book") {
            PubType::Book
        } else {
            PubType::Other
        };

        let publication = self.venue_ref().to_publication();

        // Homonym disambiguation suffixes: "Kaiming He 0001"
        let authors = self
            .authors
            .map(|list| {
                list.author
                    .into_vec()
                    .iter()
                    .map(|a| {
                        a.text
                            .chars()
                            .filter(|c| !c.is_ascii_digit())
                            .collect::<String>()
                            .trim()
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        let title = unescape_amp(&self.title);
        let title = title.strip_suffix('.').unwrap_or(&title).to_string();

        Draft {
            title,
            authors,
            publication,
            pub_time: self.year,
            pub_type: Some(pub_type),
            doi: self.doi,
            pages: self.pages,
            volume: self.volume,
            number: self.number,
            publisher: self.publisher,
            ..Default::default()
        }
    }
}

/// Search query for a title
fn query(title: &str) -> String {
    title.replace("&amp;", "").replace('&', "").replace('—', "-")
}

fn search_path(q: &str) -> String {
    format!("/search/publ/api?q={}&format=json", encode(q))
}

/// DBLP adapter
pub struct DblpAdapter;

impl DblpAdapter {
    async fn search(&self, draft: Draft, q: &str, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        let body = fetch_mirrored(fetcher, &search_path(q)).await?;
        let candidates = self.parse_response(&body)?;
        Ok(match_candidates(draft, candidates, EXACT_MATCH_THRESHOLD))
    }
}

#[async_trait]
impl SourceAdapter for DblpAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.title)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(
            format!("{}{}", HOSTS[0], search_path(&query(&draft.title))),
            EXACT_MATCH_THRESHOLD,
        ))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let hits: DblpHits<PublInfo> = serde_json::from_str(body)?;
        Ok(hits
            .into_infos()
            .into_iter()
            .filter(|info| !info.is_corr())
            .map(PublInfo::into_candidate)
            .collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        if !self.is_applicable(&draft) {
            return Ok(draft);
        }
        let q = query(&draft.title);
        let year = draft.pub_time.trim().parse::<i32>().ok();

        let mut resolved = self.search(draft, &q, fetcher).await?;
        if let Some(year) = year {
            for offset in YEAR_OFFSETS {
                if resolved.has_venue_reference() {
                    break;
                }
                let Some(scoped_year) = year.checked_sub(offset) else {
                    continue;
                };
                let scoped = format!("{} year:{}", q, scoped_year);
                debug!(source = NAME, query = %scoped, "Retrying year-scoped search");
                resolved = self.search(resolved, &scoped, fetcher).await?;
            }
        }

        if !resolved.has_venue_reference() {
            return Ok(resolved);
        }
        match resolve_venue(resolved.clone(), fetcher, WorkshopNaming::Suffix).await {
            Ok(with_venue) => Ok(with_venue),
            Err(e) => {
                // The additional stage retries the reference
                warn!(source = NAME, error = %e, "Venue lookup failed");
                Ok(resolved)
            }
        }
    }
}
