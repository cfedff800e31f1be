//! Source adapters
//!
//! One module per external metadata source. Every adapter implements
//! `SourceAdapter`; stage membership and flags live in `StageTable`, adapter
//! instances in `SourceRegistry`.
//!
//! # Sources
//! | name | stage | breakable | must-wait |
//! |---|---|---|---|
//! | doi | precise | yes | yes |
//! | arxiv | precise | no | no |
//! | chemrxivprecise | precise | no | no |
//! | dblp | fuzzy | yes | yes |
//! | openreview | fuzzy | no | no |
//! | semanticscholar | fuzzy | no | no |
//! | crossref | fuzzy | no | no |
//! | pubmed | fuzzy | no | no |
//! | chemrxivfuzzy | fuzzy | no | no |
//! | dblpvenue | additional | no | no |
//! | pwc | additional | no | no |
//! | ieee | clientside | yes | no |
//!
//! The remote aggregation service (`paperlib`) is not a stage member; the
//! resolver queries it before any stage runs.

pub mod arxiv;
pub mod bibtex;
pub mod chemrxiv;
pub mod crossref;
pub mod dblp;
pub mod dblp_venue;
pub mod doi;
pub mod ieee;
pub mod openreview;
pub mod paperlib;
pub mod pubmed;
pub mod pwc;
pub mod semanticscholar;

use crate::stage::{StageEntry, StageKind};
use crate::types::{SourceAdapter, SourceSpec};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Stages in pipeline order
pub const LOCAL_STAGES: [StageKind; 4] = [
    StageKind::Precise,
    StageKind::Fuzzy,
    StageKind::Additional,
    StageKind::Clientside,
];

// ============================================================================
// Stage table
// ============================================================================

/// Immutable stage membership: stage → ordered `(name, flags)` list
///
/// Order within a stage defines adapter rank.
#[derive(Debug, Clone)]
pub struct StageTable {
    stages: HashMap<StageKind, Vec<(&'static str, SourceSpec)>>,
}

impl StageTable {
    /// Empty table
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// Replace the members of one stage
    pub fn with_stage(mut self, stage: StageKind, members: Vec<(&'static str, SourceSpec)>) -> Self {
        self.stages.insert(stage, members);
        self
    }

    /// Stage table of the built-in sources
    pub fn standard() -> Self {
        Self::new()
            .with_stage(
                StageKind::Precise,
                vec![
                    (doi::NAME, SourceSpec::new(true, true)),
                    (arxiv::NAME, SourceSpec::new(false, false)),
                    (chemrxiv::PRECISE_NAME, SourceSpec::new(false, false)),
                ],
            )
            .with_stage(
                StageKind::Fuzzy,
                vec![
                    (dblp::NAME, SourceSpec::new(true, true)),
                    (openreview::NAME, SourceSpec::new(false, false)),
                    (semanticscholar::NAME, SourceSpec::new(false, false)),
                    (crossref::NAME, SourceSpec::new(false, false)),
                    (pubmed::NAME, SourceSpec::new(false, false)),
                    (chemrxiv::FUZZY_NAME, SourceSpec::new(false, false)),
                ],
            )
            .with_stage(
                StageKind::Additional,
                vec![
                    (dblp_venue::NAME, SourceSpec::new(false, false)),
                    (pwc::NAME, SourceSpec::new(false, false)),
                ],
            )
            .with_stage(
                StageKind::Clientside,
                vec![(ieee::NAME, SourceSpec::new(true, false))],
            )
    }

    /// Members of `stage`, in rank order
    pub fn members(&self, stage: StageKind) -> &[(&'static str, SourceSpec)] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stage a source belongs to
    pub fn stage_of(&self, name: &str) -> Option<StageKind> {
        LOCAL_STAGES
            .into_iter()
            .find(|stage| self.members(*stage).iter().any(|(n, _)| *n == name))
    }

    /// Names the aggregation service can answer for (every non-clientside member)
    pub fn aggregator_names(&self, enabled: &BTreeSet<String>) -> Vec<&'static str> {
        [StageKind::Precise, StageKind::Fuzzy, StageKind::Additional]
            .into_iter()
            .flat_map(|stage| self.members(stage).iter().map(|(name, _)| *name))
            .filter(|name| enabled.contains(*name))
            .collect()
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Adapter instances keyed by name
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in adapter
    ///
    /// The IEEE adapter disables itself when `ieee_api_key` is `None`.
    pub fn with_builtin(ieee_api_key: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(doi::DoiAdapter));
        registry.register(Arc::new(arxiv::ArxivAdapter));
        registry.register(Arc::new(chemrxiv::ChemRxivAdapter::precise()));
        registry.register(Arc::new(chemrxiv::ChemRxivAdapter::fuzzy()));
        registry.register(Arc::new(dblp::DblpAdapter));
        registry.register(Arc::new(openreview::OpenReviewAdapter));
        registry.register(Arc::new(semanticscholar::SemanticScholarAdapter));
        registry.register(Arc::new(crossref::CrossrefAdapter));
        registry.register(Arc::new(pubmed::PubMedAdapter));
        registry.register(Arc::new(dblp_venue::DblpVenueAdapter));
        registry.register(Arc::new(pwc::PapersWithCodeAdapter));
        registry.register(Arc::new(ieee::IeeeAdapter::new(ieee_api_key)));
        registry
    }

    /// Add or replace an adapter under its own name
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Enabled, registered members of `stage` in rank order
    pub fn stage_entries(
        &self,
        table: &StageTable,
        stage: StageKind,
        enabled: &BTreeSet<String>,
    ) -> Vec<StageEntry> {
        table
            .members(stage)
            .iter()
            .filter(|(name, _)| enabled.contains(*name))
            .filter_map(|(name, spec)| {
                self.get(name).map(|adapter| StageEntry {
                    adapter,
                    spec: *spec,
                })
            })
            .collect()
    }
}

/// Normalise user-facing source names
///
/// Lowercases, strips a `scraper-` prefix, expands `chemrxiv` into its
/// precise and fuzzy variants and drops names no stage knows.
pub fn expand_source_names<S: AsRef<str>>(names: &[S], table: &StageTable) -> BTreeSet<String> {
    let mut expanded = BTreeSet::new();
    for raw in names {
        let name = raw.as_ref().trim().to_lowercase();
        let name = name.strip_prefix("scraper-").unwrap_or(&name);
        if name == chemrxiv::GROUP_NAME {
            expanded.insert(chemrxiv::PRECISE_NAME.to_string());
            expanded.insert(chemrxiv::FUZZY_NAME.to_string());
        } else if table.stage_of(name).is_some() {
            expanded.insert(name.to_string());
        } else if !name.is_empty() {
            warn!(source = name, "Unknown source ignored");
        }
    }
    expanded
}

// ============================================================================
// Shared decoding helpers
// ============================================================================

/// Percent-encode a query parameter value
pub(crate) fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Collapse whitespace runs (titles often carry line breaks)
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode HTML `&amp;` entities left in upstream titles
pub(crate) fn unescape_amp(text: &str) -> String {
    text.replace("&amp;", "&")
}

/// JSON value that is either a single item or a list
///
/// `Many` is tried first: serde reads a struct from a JSON array too, so a
/// one-element list would otherwise decode as `One` with the wrong fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Scalar that some APIs send as a number and others as a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    pub(crate) fn as_string(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => n.to_string(),
        }
    }
}

/// CSL-JSON date: `{"date-parts": [[2017, 6, 12]]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CslDate {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<Option<Scalar>>>,
}

impl CslDate {
    /// First date part, when present
    pub(crate) fn year(&self) -> Option<String> {
        self.date_parts
            .first()
            .and_then(|parts| parts.first())
            .and_then(|part| part.as_ref())
            .map(Scalar::as_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_flags() {
        let table = StageTable::standard();
        assert_eq!(table.members(StageKind::Precise)[0], ("doi", SourceSpec::new(true, true)));
        assert_eq!(table.members(StageKind::Fuzzy)[0], ("dblp", SourceSpec::new(true, true)));
        assert_eq!(table.stage_of("pwc"), Some(StageKind::Additional));
        assert_eq!(table.stage_of("ieee"), Some(StageKind::Clientside));
        assert_eq!(table.stage_of("springer"), None);
    }

    #[test]
    fn test_one_element_list_decodes_as_many() {
        #[derive(Debug, Deserialize)]
        struct Named {
            name: String,
        }

        let list: OneOrMany<Named> = serde_json::from_str(r#"[{"name":"Kaiming He"}]"#).unwrap();
        assert!(matches!(list, OneOrMany::Many(_)));
        let names: Vec<String> = list.into_vec().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["Kaiming He"]);

        let single: OneOrMany<String> = serde_json::from_str(r#""CVPR""#).unwrap();
        assert_eq!(single.into_vec(), vec!["CVPR".to_string()]);
    }

    #[test]
    fn test_expand_source_names() {
        let table = StageTable::standard();
        let names = expand_source_names(&["DOI", "scraper-chemrxiv", "bogus", " dblp "], &table);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["chemrxivfuzzy", "chemrxivprecise", "dblp", "doi"]);
    }

    #[test]
    fn test_aggregator_names_exclude_clientside() {
        let table = StageTable::standard();
        let enabled = expand_source_names(&["ieee", "pwc", "doi", "dblp"], &table);
        assert_eq!(table.aggregator_names(&enabled), vec!["doi", "dblp", "pwc"]);
    }

    #[test]
    fn test_stage_entries_follow_table_order() {
        let table = StageTable::standard();
        let registry = SourceRegistry::with_builtin(None);
        assert_eq!(registry.len(), 12);

        let enabled = expand_source_names(&["crossref", "dblp", "semanticscholar"], &table);
        let names: Vec<&str> = registry
            .stage_entries(&table, StageKind::Fuzzy, &enabled)
            .iter()
            .map(|e| e.adapter.name())
            .collect();
        assert_eq!(names, vec!["dblp", "semanticscholar", "crossref"]);
    }

    #[test]
    fn test_csl_date_year() {
        let date: CslDate = serde_json::from_str(r#"{"date-parts": [[2017, 6]]}"#).unwrap();
        assert_eq!(date.year().as_deref(), Some("2017"));
        let empty: CslDate = serde_json::from_str(r#"{"date-parts": [[null]]}"#).unwrap();
        assert_eq!(empty.year(), None);
    }
}
