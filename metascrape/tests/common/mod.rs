//! Shared fixtures for resolution integration tests

use async_trait::async_trait;
use metascrape::{Draft, Fetcher, ScrapeError, ScrapeResult};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory fetcher answering by URL substring, optionally after a delay
#[derive(Default)]
pub struct RouteFetcher {
    routes: Vec<Route>,
    requests: Mutex<Vec<String>>,
}

struct Route {
    pattern: String,
    body: String,
    delay: Duration,
}

impl RouteFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, body: &str) -> Self {
        self.delayed_route(pattern, body, Duration::ZERO)
    }

    pub fn delayed_route(mut self, pattern: &str, body: &str, delay: Duration) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            body: body.to_string(),
            delay,
        });
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for RouteFetcher {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _max_retries: u32,
        _timeout: Duration,
    ) -> ScrapeResult<String> {
        self.requests.lock().unwrap().push(url.to_string());
        let route = self
            .routes
            .iter()
            .find(|route| url.contains(route.pattern.as_str()))
            .ok_or_else(|| ScrapeError::Status {
                status: 404,
                url: url.to_string(),
            })?;
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        Ok(route.body.clone())
    }
}

pub fn draft(json: &str) -> Draft {
    serde_json::from_str(json).unwrap()
}

pub const ARXIV_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
  </entry>
</feed>"#;

pub const RESNET_CSL: &str = r#"{
    "type":"proceedings-article",
    "title":"Deep Residual Learning for Image Recognition",
    "author":[{"given":"Kaiming","family":"He"},{"given":"Xiangyu","family":"Zhang"}],
    "published":{"date-parts":[[2016,6]]},
    "container-title":"2016 IEEE Conference on Computer Vision and Pattern Recognition (CVPR)",
    "page":"770-778"
}"#;

pub const RESNET_S2_SEARCH: &str = r#"{"total":1,"offset":0,"data":[{
    "paperId":"2c03df8b48bf3fa39054345bafabfeff15bfd11d",
    "externalIds":{"ArXiv":"1512.03385"},
    "title":"Deep Residual Learning for Image Recognition",
    "year":2016,
    "authors":[{"name":"Kaiming He"},{"name":"Jian Sun"}],
    "publicationVenue":{"name":"Computer Vision and Pattern Recognition","type":"conference"}
}]}"#;

pub const RESNET_CROSSREF_SEARCH: &str = r#"{"status":"ok","message":{"items":[{
    "title":["Deep Residual Learning for Image Recognition."],
    "DOI":"10.1109/CVPR.2016.90",
    "type":"proceedings-article",
    "author":[{"given":"Kaiming","family":"He"}],
    "container-title":["2016 IEEE Conference on Computer Vision and Pattern Recognition (CVPR)"],
    "published":{"date-parts":[[2015,12]]},
    "page":"770-778"
}]}}"#;
