//! Scripted adapters and fetchers for unit tests

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::Fetcher;
use crate::types::{Draft, SourceAdapter, SourceRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Adapter that sleeps, then returns a fixed patch or error
pub struct ScriptedAdapter {
    pub name: &'static str,
    pub delay: Duration,
    pub patch: Option<Draft>,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
    pub started: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedAdapter {
    pub fn new(name: &'static str, delay: Duration, patch: Draft) -> Self {
        Self {
            name,
            delay,
            patch: Some(patch),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(name: &'static str, delay: Duration) -> Self {
        Self {
            fail: true,
            patch: None,
            ..Self::new(name, delay, Draft::default())
        }
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_applicable(&self, _draft: &Draft) -> bool {
        true
    }

    fn build_request(&self, _draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(format!("mock://{}", self.name), -1.0))
    }

    fn parse_response(&self, _body: &str) -> ScrapeResult<Vec<Draft>> {
        Ok(self.patch.iter().cloned().collect())
    }

    async fn resolve(&self, draft: Draft, _fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut started) = self.started.lock() {
            started.push(Instant::now());
        }
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(ScrapeError::Network(format!("{} unreachable", self.name)));
        }
        Ok(match &self.patch {
            Some(patch) => crate::merge::merge_candidate(draft, patch),
            None => draft,
        })
    }
}

/// Fetcher serving canned bodies by URL substring
#[derive(Default)]
pub struct MapFetcher {
    routes: Vec<(String, String)>,
    pub requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, body: &str) -> Self {
        self.routes.push((pattern.to_string(), body.to_string()));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _max_retries: u32,
        _timeout: Duration,
    ) -> ScrapeResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.routes
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| ScrapeError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Convenience: `Arc<dyn Fetcher>` that answers nothing
pub fn empty_fetcher() -> Arc<dyn Fetcher> {
    Arc::new(MapFetcher::new())
}

/// Field patch helper: `patch(&[("title", "X"), ("pubTime", "2020")])`
pub fn patch(fields: &[(&str, &str)]) -> Draft {
    let map: HashMap<&str, &str> = fields.iter().copied().collect();
    let value = serde_json::to_value(map).unwrap_or_default();
    serde_json::from_value(value).unwrap_or_default()
}
