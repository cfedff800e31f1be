//! # metascrape common library
//!
//! Shared code for the metascrape engine and binary:
//! - Configuration loading (TOML, environment, CLI overrides)
//! - Progress events (ScrapeEvent enum and EventBus)
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
