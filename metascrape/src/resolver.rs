//! Resolution orchestrator
//!
//! Drives each draft through the resolution state machine:
//!
//! ```text
//! Aggregator → LocalPrecise → LocalFuzzy → LocalAdditional
//!            ↘                                  ↓
//!              Clientside → ClientsideAdditional → Done
//! ```
//!
//! - Complete drafts skip straight to `Done` unless resolution is forced.
//! - A usable aggregator answer skips the local stages.
//! - The fuzzy and clientside stages only run while the draft is incomplete.
//!
//! Batches run with bounded concurrency and report progress on the
//! `EventBus`. Per-source failures are collected, never raised.

use crate::error::ScrapeResult;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::merge::apply_authoritative;
use crate::sources::paperlib::{self, PaperlibAggregator};
use crate::sources::{expand_source_names, SourceRegistry, StageTable};
use crate::stage::{StageKind, StageRunner};
use crate::types::{is_empty_value, Draft, SourceFailure};
use futures::stream::{self, StreamExt};
use metascrape_common::config::ScrapeConfig;
use metascrape_common::events::{EventBus, ScrapeEvent};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of drafts resolved concurrently
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Orchestrator states, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    Aggregator,
    LocalPrecise,
    LocalFuzzy,
    LocalAdditional,
    Clientside,
    ClientsideAdditional,
    Done,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionState::Aggregator => "aggregator",
            ResolutionState::LocalPrecise => "local_precise",
            ResolutionState::LocalFuzzy => "local_fuzzy",
            ResolutionState::LocalAdditional => "local_additional",
            ResolutionState::Clientside => "clientside",
            ResolutionState::ClientsideAdditional => "clientside_additional",
            ResolutionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of resolving one draft
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub draft: Draft,
    pub failures: Vec<SourceFailure>,
    /// States entered, in order
    pub visited: Vec<ResolutionState>,
}

/// Multi-source metadata resolver
#[derive(Clone)]
pub struct Resolver {
    registry: SourceRegistry,
    table: Arc<StageTable>,
    fetcher: Arc<dyn Fetcher>,
    runner: StageRunner,
    aggregator: Option<PaperlibAggregator>,
    events: EventBus,
    batch_concurrency: usize,
}

impl Resolver {
    /// Resolver over `registry` with the standard stage table
    pub fn new(registry: SourceRegistry, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            registry,
            table: Arc::new(StageTable::standard()),
            runner: StageRunner::new(Arc::clone(&fetcher)),
            fetcher,
            aggregator: Some(PaperlibAggregator),
            events: EventBus::default(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    /// Resolver with the built-in sources and an HTTP fetcher built from `config`
    pub fn from_config(config: &ScrapeConfig) -> ScrapeResult<Self> {
        let fetcher = HttpFetcher::new(config.requests_per_second)?;
        Ok(Self::new(
            SourceRegistry::with_builtin(config.ieee_api_key.clone()),
            Arc::new(fetcher),
        )
        .with_batch_concurrency(config.batch_concurrency))
    }

    pub fn with_table(mut self, table: StageTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    /// Publish progress on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Skip the aggregation service; every draft takes the local pipeline
    pub fn without_aggregator(mut self) -> Self {
        self.aggregator = None;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// Event bus progress is published on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Resolve a batch, returning drafts in input order
    pub async fn resolve<S: AsRef<str>>(
        &self,
        drafts: Vec<Draft>,
        enabled_sources: &[S],
        force: bool,
    ) -> Vec<Draft> {
        self.resolve_with_report(drafts, enabled_sources, force)
            .await
            .into_iter()
            .map(|report| report.draft)
            .collect()
    }

    /// Resolve a batch, keeping per-draft failures and visited states
    pub async fn resolve_with_report<S: AsRef<str>>(
        &self,
        drafts: Vec<Draft>,
        enabled_sources: &[S],
        force: bool,
    ) -> Vec<ResolutionReport> {
        let enabled = expand_source_names(enabled_sources, &self.table);
        let batch_id = Uuid::new_v4();
        let total = drafts.len();
        info!(batch_id = %batch_id, total, sources = ?enabled, force, "Resolving batch");
        self.events.emit_lossy(ScrapeEvent::BatchStarted {
            batch_id,
            total,
            timestamp: chrono::Utc::now(),
        });

        let completed = AtomicUsize::new(0);
        let enabled = &enabled;
        let completed = &completed;
        let mut reports: Vec<(usize, ResolutionReport)> = stream::iter(drafts.into_iter().enumerate())
            .map(|(index, draft)| async move {
                let report = self.resolve_one(draft, enabled, force).await;
                for failure in &report.failures {
                    self.events.emit_lossy(ScrapeEvent::SourceFailed {
                        batch_id,
                        source: failure.source.clone(),
                        message: failure.message.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                }
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                self.events.emit_lossy(ScrapeEvent::DraftResolved {
                    batch_id,
                    completed: done,
                    total,
                    timestamp: chrono::Utc::now(),
                });
                (index, report)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        reports.sort_by_key(|(index, _)| *index);
        let reports: Vec<ResolutionReport> = reports.into_iter().map(|(_, report)| report).collect();

        let complete = reports.iter().filter(|r| r.draft.is_complete()).count();
        info!(batch_id = %batch_id, total, complete, "Batch resolved");
        self.events.emit_lossy(ScrapeEvent::BatchCompleted {
            batch_id,
            total,
            complete,
            timestamp: chrono::Utc::now(),
        });
        reports
    }

    /// Resolve one draft against the canonical source names in `enabled`
    pub async fn resolve_one(
        &self,
        draft: Draft,
        enabled: &BTreeSet<String>,
        force: bool,
    ) -> ResolutionReport {
        let mut report = ResolutionReport {
            draft,
            failures: Vec::new(),
            visited: Vec::new(),
        };
        let mut state = if report.draft.is_complete() && !force {
            ResolutionState::Done
        } else {
            ResolutionState::Aggregator
        };

        loop {
            report.visited.push(state);
            debug!(state = %state, title = %report.draft.title, "Resolution state");
            state = match state {
                ResolutionState::Aggregator => self.query_aggregator(&mut report, enabled).await,
                ResolutionState::LocalPrecise => {
                    self.run_stage(StageKind::Precise, &mut report, enabled).await;
                    ResolutionState::LocalFuzzy
                }
                ResolutionState::LocalFuzzy => {
                    if !report.draft.is_complete() {
                        self.run_stage(StageKind::Fuzzy, &mut report, enabled).await;
                    }
                    ResolutionState::LocalAdditional
                }
                ResolutionState::LocalAdditional => {
                    self.run_stage(StageKind::Additional, &mut report, enabled).await;
                    ResolutionState::Clientside
                }
                ResolutionState::Clientside => {
                    if report.draft.is_complete() {
                        ResolutionState::Done
                    } else {
                        let applicable = self
                            .registry
                            .stage_entries(&self.table, StageKind::Clientside, enabled)
                            .iter()
                            .any(|entry| entry.adapter.is_applicable(&report.draft));
                        if applicable {
                            self.run_stage(StageKind::Clientside, &mut report, enabled).await;
                            ResolutionState::ClientsideAdditional
                        } else {
                            ResolutionState::Done
                        }
                    }
                }
                ResolutionState::ClientsideAdditional => {
                    self.run_stage(StageKind::Additional, &mut report, enabled).await;
                    ResolutionState::Done
                }
                ResolutionState::Done => break,
            };
        }

        // Venue references that no stage could resolve are not a venue
        if report.draft.has_venue_reference() {
            debug!(publication = %report.draft.publication, "Dropping unresolved venue reference");
            report.draft.publication.clear();
        }
        report
    }

    /// Apply the aggregation service's answer and pick the next state
    async fn query_aggregator(
        &self,
        report: &mut ResolutionReport,
        enabled: &BTreeSet<String>,
    ) -> ResolutionState {
        let Some(aggregator) = self.aggregator.filter(|a| a.is_applicable(&report.draft)) else {
            return ResolutionState::LocalPrecise;
        };

        let scrapers = self.table.aggregator_names(enabled);
        match aggregator.query(&report.draft, &scrapers, self.fetcher.as_ref()).await {
            Ok(scraped) => {
                report.draft = apply_authoritative(std::mem::take(&mut report.draft), &scraped);
                let has_identifier =
                    !is_empty_value(&report.draft.doi) || !is_empty_value(&report.draft.arxiv);
                if is_empty_value(&scraped.publication) && has_identifier {
                    debug!(source = paperlib::NAME, "No venue from aggregator, running local sources");
                    ResolutionState::LocalPrecise
                } else {
                    ResolutionState::Clientside
                }
            }
            Err(e) => {
                warn!(source = paperlib::NAME, error = %e, "Aggregator failed, running local sources");
                report.failures.push(SourceFailure::new(paperlib::NAME, &e));
                ResolutionState::LocalPrecise
            }
        }
    }

    async fn run_stage(&self, stage: StageKind, report: &mut ResolutionReport, enabled: &BTreeSet<String>) {
        let entries = self.registry.stage_entries(&self.table, stage, enabled);
        if entries.is_empty() {
            return;
        }
        let outcome = self
            .runner
            .run(stage, std::mem::take(&mut report.draft), &entries)
            .await;
        report.draft = outcome.draft;
        report.failures.extend(outcome.failures);
    }
}
