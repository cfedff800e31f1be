//! Stage Runner
//!
//! Runs the enabled adapters of one stage concurrently against one draft.
//!
//! # Behaviour
//! - Each adapter runs as its own tokio task on a private snapshot copy.
//! - Adapter `i` starts after `gap × i` (staggering).
//! - Results are folded one at a time with `merge_ranked` using
//!   `rank = stage offset + i`, so lower-index adapters win fields even when
//!   they finish last.
//! - The stage ends early once a breakable adapter has succeeded, the draft
//!   is complete and every must-wait adapter has finished.
//! - A 20 s ceiling bounds the stage; outstanding tasks are cancelled and
//!   contribute nothing.
//! - A panicking adapter is reported as that source's failure and counts as
//!   finished.

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::Fetcher;
use crate::merge::{merge_ranked, MergePriorityLevel};
use crate::types::{Draft, SourceAdapter, SourceFailure, SourceSpec};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hard ceiling on stage wall-clock time
pub const STAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Local pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Identifier-keyed sources (DOI, arXiv id)
    Precise,
    /// Title-keyed sources
    Fuzzy,
    /// Enrichment independent of completeness (venue lookup, code links)
    Additional,
    /// Sources needing a user credential
    Clientside,
}

impl StageKind {
    /// Base rank of the stage's first adapter
    pub fn offset(self) -> i32 {
        match self {
            StageKind::Precise => 0,
            StageKind::Fuzzy => 200,
            StageKind::Clientside => 300,
            StageKind::Additional => 400,
        }
    }

    /// Delay between consecutive adapter starts
    pub fn gap(self) -> Duration {
        match self {
            StageKind::Fuzzy => Duration::from_millis(500),
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Precise => write!(f, "precise"),
            StageKind::Fuzzy => write!(f, "fuzzy"),
            StageKind::Additional => write!(f, "additional"),
            StageKind::Clientside => write!(f, "clientside"),
        }
    }
}

/// One enabled adapter with its stage flags
#[derive(Clone)]
pub struct StageEntry {
    pub adapter: Arc<dyn SourceAdapter>,
    pub spec: SourceSpec,
}

/// Result of one stage run
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub draft: Draft,
    pub failures: Vec<SourceFailure>,
    /// Early-termination condition was reached
    pub ended_early: bool,
    /// Stage ceiling elapsed with adapters outstanding
    pub timed_out: bool,
}

/// Output of one adapter task
struct AdapterRun {
    index: usize,
    name: &'static str,
    spec: SourceSpec,
    result: ScrapeResult<Draft>,
}

/// Runs stages against a shared fetcher
#[derive(Clone)]
pub struct StageRunner {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl StageRunner {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            timeout: STAGE_TIMEOUT,
        }
    }

    /// Override the stage ceiling
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `entries` (in rank order) against `draft`
    pub async fn run(&self, stage: StageKind, draft: Draft, entries: &[StageEntry]) -> StageOutcome {
        let mut outcome = StageOutcome {
            draft,
            failures: Vec::new(),
            ended_early: false,
            timed_out: false,
        };
        if entries.is_empty() {
            return outcome;
        }

        let origin = outcome.draft.clone();
        let mut levels = MergePriorityLevel::new();
        let mut must_wait_remaining = entries.iter().filter(|e| e.spec.must_wait).count();
        let mut breakable_done = false;

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let gap = stage.gap();

        for (index, entry) in entries.iter().enumerate() {
            let adapter = Arc::clone(&entry.adapter);
            let fetcher = Arc::clone(&self.fetcher);
            let snapshot = origin.clone();
            let token = cancel.child_token();
            let spec = entry.spec;
            let delay = gap * index as u32;

            tasks.spawn(async move {
                let name = adapter.name();
                let attempt = async {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    adapter.resolve(snapshot, fetcher.as_ref()).await
                };
                let result = tokio::select! {
                    _ = token.cancelled() => return None,
                    caught = AssertUnwindSafe(attempt).catch_unwind() => match caught {
                        Ok(result) => result,
                        Err(_) => Err(ScrapeError::Internal(format!("{} panicked", name))),
                    },
                };
                Some(AdapterRun {
                    index,
                    name,
                    spec,
                    result,
                })
            });
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            let joined = tokio::select! {
                _ = &mut deadline => {
                    debug!(stage = %stage, outstanding = tasks.len(), "Stage timed out");
                    outcome.timed_out = true;
                    break;
                }
                joined = tasks.join_next() => joined,
            };

            let run = match joined {
                None => break,
                Some(Ok(Some(run))) => run,
                Some(Ok(None)) => continue,
                Some(Err(e)) => {
                    warn!(stage = %stage, error = %e, "Source task aborted");
                    outcome.failures.push(SourceFailure {
                        source: "unknown".to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if run.spec.must_wait {
                must_wait_remaining = must_wait_remaining.saturating_sub(1);
            }

            match run.result {
                Ok(scraped) => {
                    let rank = stage.offset() + run.index as i32;
                    let taken = merge_ranked(&origin, &mut outcome.draft, &scraped, &mut levels, rank);
                    debug!(
                        source = run.name,
                        stage = %stage,
                        rank,
                        fields = taken.len(),
                        "Source merged"
                    );
                    if run.spec.breakable {
                        breakable_done = true;
                    }
                }
                Err(e) => {
                    warn!(
                        source = run.name,
                        stage = %stage,
                        error = %e,
                        "Source failed (stage continues)"
                    );
                    outcome.failures.push(SourceFailure::new(run.name, &e));
                }
            }

            if breakable_done && must_wait_remaining == 0 && outcome.draft.is_complete() {
                debug!(stage = %stage, outstanding = tasks.len(), "Stage ended early");
                outcome.ended_early = !tasks.is_empty();
                break;
            }
        }

        cancel.cancel();
        tasks.abort_all();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{empty_fetcher, patch, ScriptedAdapter};
    use crate::types::{SourceRequest, ACCEPT_FIRST};
    use async_trait::async_trait;
    use tokio::time::Instant;

    /// Adapter whose resolve panics after a delay
    struct PanickingAdapter(Duration);

    #[async_trait]
    impl SourceAdapter for PanickingAdapter {
        fn name(&self) -> &'static str {
            "panicker"
        }

        fn is_applicable(&self, _draft: &Draft) -> bool {
            true
        }

        fn build_request(&self, _draft: &Draft) -> ScrapeResult<SourceRequest> {
            Ok(SourceRequest::get("https://example.invalid/", ACCEPT_FIRST))
        }

        fn parse_response(&self, _body: &str) -> ScrapeResult<Vec<Draft>> {
            Ok(Vec::new())
        }

        async fn resolve(&self, _draft: Draft, _fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
            tokio::time::sleep(self.0).await;
            panic!("adapter bug");
        }
    }

    fn entry(adapter: ScriptedAdapter, breakable: bool, must_wait: bool) -> StageEntry {
        StageEntry {
            adapter: Arc::new(adapter),
            spec: SourceSpec::new(breakable, must_wait),
        }
    }

    fn complete_patch(title: &str) -> Draft {
        patch(&[
            ("title", title),
            ("authors", "Kaiming He"),
            ("pubTime", "2016"),
            ("publication", "CVPR"),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_rank_beats_completion_order() {
        let runner = StageRunner::new(empty_fetcher());
        let entries = vec![
            entry(
                ScriptedAdapter::new("slow-first", Duration::from_millis(300), patch(&[("title", "Rank 0")])),
                false,
                false,
            ),
            entry(
                ScriptedAdapter::new(
                    "fast-second",
                    Duration::from_millis(10),
                    patch(&[("title", "Rank 1"), ("volume", "7")]),
                ),
                false,
                false,
            ),
        ];

        let outcome = runner.run(StageKind::Precise, Draft::default(), &entries).await;
        assert_eq!(outcome.draft.title, "Rank 0", "Lower rank wins even when it finishes last");
        assert_eq!(outcome.draft.volume, "7", "Non-overlapping fields still merge");
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_termination_skips_best_effort_sources() {
        let runner = StageRunner::new(empty_fetcher());
        let straggler = ScriptedAdapter::new("straggler", Duration::from_secs(15), patch(&[("pages", "1-9")]));
        let entries = vec![
            entry(
                ScriptedAdapter::new("anchor", Duration::from_millis(50), complete_patch("ResNet")),
                true,
                true,
            ),
            entry(straggler, false, false),
        ];

        let start = Instant::now();
        let outcome = runner.run(StageKind::Precise, Draft::default(), &entries).await;
        assert!(outcome.ended_early);
        assert!(!outcome.timed_out);
        assert!(start.elapsed() < Duration::from_secs(1), "Must not wait for the straggler");
        assert!(outcome.draft.pages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_must_wait_source_blocks_early_exit() {
        let runner = StageRunner::new(empty_fetcher());
        let entries = vec![
            entry(
                ScriptedAdapter::new("breaker", Duration::from_millis(10), complete_patch("ResNet")),
                true,
                false,
            ),
            entry(
                ScriptedAdapter::new("anchor", Duration::from_secs(2), patch(&[("doi", "10.1109/CVPR.2016.90")])),
                false,
                true,
            ),
            entry(
                ScriptedAdapter::new("straggler", Duration::from_secs(15), patch(&[("pages", "1-9")])),
                false,
                false,
            ),
        ];

        let start = Instant::now();
        let outcome = runner.run(StageKind::Precise, Draft::default(), &entries).await;
        let elapsed = start.elapsed();
        assert!(outcome.ended_early);
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
        assert_eq!(outcome.draft.doi, "10.1109/CVPR.2016.90");
        assert!(outcome.draft.pages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_abandons_sources() {
        let runner = StageRunner::new(empty_fetcher());
        let entries = vec![entry(
            ScriptedAdapter::new("hung", Duration::from_secs(60), complete_patch("Late")),
            true,
            true,
        )];

        let start = Instant::now();
        let outcome = runner.run(StageKind::Precise, Draft::with_title("Seed"), &entries).await;
        assert!(outcome.timed_out);
        let elapsed = start.elapsed();
        assert!(elapsed >= STAGE_TIMEOUT && elapsed < STAGE_TIMEOUT + Duration::from_secs(1));
        assert_eq!(outcome.draft, Draft::with_title("Seed"), "Abandoned source contributes nothing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_collected_without_aborting() {
        let runner = StageRunner::new(empty_fetcher());
        let entries = vec![
            entry(ScriptedAdapter::failing("broken", Duration::from_millis(5)), true, true),
            entry(
                ScriptedAdapter::new("working", Duration::from_millis(20), patch(&[("publisher", "IEEE")])),
                false,
                false,
            ),
        ];

        let outcome = runner.run(StageKind::Precise, Draft::default(), &entries).await;
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source, "broken");
        assert_eq!(outcome.draft.publisher, "IEEE");
        assert!(!outcome.ended_early);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_must_wait_source_is_attributed() {
        let runner = StageRunner::new(empty_fetcher());
        let entries = vec![
            entry(
                ScriptedAdapter::new("breaker", Duration::from_millis(10), complete_patch("ResNet")),
                true,
                false,
            ),
            StageEntry {
                adapter: Arc::new(PanickingAdapter(Duration::from_millis(50))),
                spec: SourceSpec::new(false, true),
            },
            entry(
                ScriptedAdapter::new("straggler", Duration::from_secs(15), patch(&[("pages", "1-9")])),
                false,
                false,
            ),
        ];

        let start = Instant::now();
        let outcome = runner.run(StageKind::Precise, Draft::default(), &entries).await;
        assert!(outcome.ended_early, "A panicked must-wait source counts as finished");
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source, "panicker");
        assert!(outcome.draft.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fuzzy_stage_staggers_starts() {
        let runner = StageRunner::new(empty_fetcher());
        let first = ScriptedAdapter::new("first", Duration::ZERO, patch(&[("volume", "1")]));
        let second = ScriptedAdapter::new("second", Duration::ZERO, patch(&[("number", "2")]));
        let first_started = Arc::clone(&first.started);
        let second_started = Arc::clone(&second.started);
        let entries = vec![entry(first, false, false), entry(second, false, false)];

        let start = Instant::now();
        runner.run(StageKind::Fuzzy, Draft::default(), &entries).await;

        let first_at = first_started.lock().unwrap()[0];
        let second_at = second_started.lock().unwrap()[0];
        assert_eq!(first_at - start, Duration::ZERO);
        let second_delay = second_at - start;
        assert!(second_delay >= StageKind::Fuzzy.gap());
        assert!(second_delay < StageKind::Fuzzy.gap() + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_empty_stage_is_noop() {
        let runner = StageRunner::new(empty_fetcher());
        let outcome = runner.run(StageKind::Additional, Draft::with_title("X"), &[]).await;
        assert_eq!(outcome.draft, Draft::with_title("X"));
        assert!(outcome.failures.is_empty());
    }
}
