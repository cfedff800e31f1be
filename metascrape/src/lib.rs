//! metascrape library interface
//!
//! Multi-source bibliographic metadata resolution. A `Resolver` takes partial
//! paper records (`Draft`s) and completes them from scholarly sources run in
//! staged, rank-ordered parallel.

pub mod error;
pub mod fetch;
pub mod io;
pub mod matcher;
pub mod merge;
pub mod resolver;
pub mod sources;
pub mod stage;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use crate::error::{ScrapeError, ScrapeResult};
pub use crate::fetch::{Fetcher, HttpFetcher};
pub use crate::resolver::{ResolutionReport, ResolutionState, Resolver};
pub use crate::sources::{SourceRegistry, StageTable};
pub use crate::stage::{StageKind, StageRunner};
pub use crate::types::{Draft, PubType, SourceAdapter, SourceFailure, SourceRequest, SourceSpec};
