//! DBLP venue resolution (additional stage)
//!
//! Turns a `dblp://{"venueID":..,"paperKey":..}` publication into a venue
//! name. The venue search and the record's `.bib` export are fetched
//! concurrently; a workshop booktitle in the bib marks the paper as a
//! workshop paper.

use super::bibtex;
use super::dblp::{fetch_mirrored, DblpHits};
use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::Fetcher;
use crate::types::{Draft, PubType, SourceAdapter, SourceRequest, ACCEPT_FIRST, DBLP_VENUE_PREFIX};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const NAME: &str = "dblpvenue";

/// Payload of a `dblp://` publication reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRef {
    #[serde(rename = "venueID", default)]
    pub venue_id: String,
    #[serde(rename = "paperKey", default)]
    pub paper_key: String,
}

impl VenueRef {
    pub fn new(venue_id: impl Into<String>, paper_key: impl Into<String>) -> Self {
        Self {
            venue_id: venue_id.into(),
            paper_key: paper_key.into(),
        }
    }

    /// Encode as a publication value
    pub fn to_publication(&self) -> String {
        // Serializing two plain strings cannot fail
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", DBLP_VENUE_PREFIX, payload)
    }

    /// Decode a publication value, `None` when it is not a venue reference
    pub fn parse(publication: &str) -> Option<Self> {
        let payload = publication.trim().strip_prefix(DBLP_VENUE_PREFIX)?;
        serde_json::from_str(payload).ok()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VenueInfo {
    venue: String,
    url: String,
}

fn venue_hits(body: &str) -> ScrapeResult<Vec<VenueInfo>> {
    let hits: DblpHits<VenueInfo> = serde_json::from_str(body)?;
    Ok(hits.into_infos())
}

fn venue_search_path(venue_id: &str) -> String {
    format!("/search/venue/api?q={}&format=json", super::encode(venue_id))
}

/// How a workshop paper's venue is named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkshopNaming {
    /// Venue name plus `" Workshop"` (inline lookups from publication search)
    Suffix,
    /// The record's full `booktitle` (additional-stage lookups)
    Booktitle,
}

/// Resolve the draft's venue reference in place
///
/// An unresolvable reference leaves an empty publication. Errors from the
/// venue search are returned; a missing `.bib` export is tolerated.
pub(crate) async fn resolve_venue(
    mut draft: Draft,
    fetcher: &dyn Fetcher,
    workshop: WorkshopNaming,
) -> ScrapeResult<Draft> {
    let Some(venue_ref) = VenueRef::parse(&draft.publication) else {
        if draft.has_venue_reference() {
            draft.publication.clear();
        }
        return Ok(draft);
    };

    let venue_path = venue_search_path(&venue_ref.venue_id);
    let venue_search = fetch_mirrored(fetcher, &venue_path);
    let bib_export = async {
        if venue_ref.paper_key.is_empty() {
            return None;
        }
        let path = format!("/rec/{}.bib?param=1", venue_ref.paper_key);
        match fetch_mirrored(fetcher, &path).await {
            Ok(body) => bibtex::parse_first(&body),
            Err(e) => {
                debug!(source = NAME, error = %e, "No bib export for record");
                None
            }
        }
    };
    let (venues, bib) = futures::join!(venue_search, bib_export);

    // Venue URLs look like `https://dblp.org/db/conf/cvpr/`
    let needle = format!("{}/", venue_ref.venue_id.to_lowercase().trim_end_matches('/'));
    draft.publication = venue_hits(&venues?)?
        .into_iter()
        .find(|info| format!("{}/", info.url.to_lowercase().trim_end_matches('/')).contains(&needle))
        .map(|info| info.venue)
        .unwrap_or_default();

    if let Some(record) = bib {
        if record.container_title.to_lowercase().contains("workshop") {
            draft.publication = match workshop {
                WorkshopNaming::Suffix => format!("{} Workshop", draft.publication),
                WorkshopNaming::Booktitle => record.container_title,
            };
            draft.pub_type = Some(PubType::Conference);
        }
    }

    debug!(source = NAME, venue_id = %venue_ref.venue_id, publication = %draft.publication, "Venue resolved");
    Ok(draft)
}

/// DBLP venue adapter
pub struct DblpVenueAdapter;

#[async_trait]
impl SourceAdapter for DblpVenueAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        draft.has_venue_reference()
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        let venue_ref = VenueRef::parse(&draft.publication)
            .ok_or_else(|| ScrapeError::InvalidRequest("Malformed DBLP venue reference".to_string()))?;
        Ok(SourceRequest::get(
            format!("https://dblp.org{}", venue_search_path(&venue_ref.venue_id)),
            ACCEPT_FIRST,
        ))
    }

    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        Ok(venue_hits(body)?
            .into_iter()
            .map(|info| Draft {
                publication: info.venue,
                ..Default::default()
            })
            .collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        if !self.is_applicable(&draft) {
            return Ok(draft);
        }
        resolve_venue(draft, fetcher, WorkshopNaming::Booktitle).await
    }
}
