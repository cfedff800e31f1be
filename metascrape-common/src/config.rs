//! Configuration loading and resolution
//!
//! Settings are resolved with the priority order:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`METASCRAPE_PRESET`, `METASCRAPE_IEEE_API_KEY`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Environment variable holding the preset name
pub const ENV_PRESET: &str = "METASCRAPE_PRESET";

/// Environment variable holding the IEEE Xplore API key
pub const ENV_IEEE_API_KEY: &str = "METASCRAPE_IEEE_API_KEY";

/// Source bundle presets
///
/// Each preset selects the sources that work best for one research field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    General,
    Cs,
    Es,
    Phy,
}

impl Preset {
    /// Sources enabled by this preset
    pub fn enabled_sources(self) -> &'static [&'static str] {
        match self {
            Preset::General | Preset::Cs => &[
                "arxiv",
                "crossref",
                "dblp",
                "doi",
                "openreview",
                "pwc",
                "semanticscholar",
            ],
            Preset::Es => &["crossref", "doi", "semanticscholar"],
            Preset::Phy => &["arxiv", "crossref", "doi", "semanticscholar"],
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::General => write!(f, "general"),
            Preset::Cs => write!(f, "cs"),
            Preset::Es => write!(f, "es"),
            Preset::Phy => write!(f, "phy"),
        }
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(Preset::General),
            "cs" => Ok(Preset::Cs),
            "es" => Ok(Preset::Es),
            "phy" => Ok(Preset::Phy),
            other => Err(Error::InvalidInput(format!(
                "Unknown preset '{}' (expected general, cs, es or phy)",
                other
            ))),
        }
    }
}

/// Configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Source bundle preset
    #[serde(default)]
    pub preset: Preset,

    /// Per-source toggles applied on top of the preset (`dblp = false`)
    #[serde(default)]
    pub sources: BTreeMap<String, bool>,

    /// IEEE Xplore API key (clientside stage)
    #[serde(default)]
    pub ieee_api_key: Option<String>,

    /// Number of drafts resolved concurrently
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Global outbound request budget
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            sources: BTreeMap::new(),
            ieee_api_key: None,
            batch_concurrency: default_batch_concurrency(),
            requests_per_second: default_requests_per_second(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_batch_concurrency() -> usize {
    4
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicit config file (must exist when given)
    pub config_path: Option<PathBuf>,
    /// Preset name
    pub preset: Option<Preset>,
    /// Exact list of enabled sources, bypassing preset and toggles
    pub sources: Option<Vec<String>>,
    /// IEEE Xplore API key
    pub ieee_api_key: Option<String>,
    /// Drafts resolved concurrently
    pub batch_concurrency: Option<usize>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    /// Enabled source names, sorted
    pub enabled_sources: Vec<String>,
    /// IEEE Xplore API key, if configured
    pub ieee_api_key: Option<String>,
    /// Drafts resolved concurrently (at least 1)
    pub batch_concurrency: usize,
    /// Outbound request budget per second (at least 1)
    pub requests_per_second: u32,
    /// Log level directive
    pub log_level: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        ScrapeConfig::from_toml(TomlConfig::default(), None)
    }
}

impl ScrapeConfig {
    /// Build a runtime config from file contents and an optional preset override
    fn from_toml(toml_config: TomlConfig, preset_override: Option<Preset>) -> Self {
        let preset = preset_override.unwrap_or(toml_config.preset);
        let mut enabled: BTreeMap<String, bool> = preset
            .enabled_sources()
            .iter()
            .map(|name| (name.to_string(), true))
            .collect();
        for (name, on) in &toml_config.sources {
            enabled.insert(name.to_lowercase(), *on);
        }

        Self {
            enabled_sources: enabled
                .into_iter()
                .filter_map(|(name, on)| on.then_some(name))
                .collect(),
            ieee_api_key: toml_config.ieee_api_key.filter(|k| is_valid_key(k)),
            batch_concurrency: toml_config.batch_concurrency.max(1),
            requests_per_second: toml_config.requests_per_second.max(1),
            log_level: toml_config.logging.level,
        }
    }
}

/// Default per-user config file location (`~/.config/metascrape/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("metascrape").join("config.toml"))
}

/// Read and decode a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)?;
    debug!("Loaded config file {}", path.display());
    Ok(config)
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the runtime configuration from CLI → ENV → TOML → defaults
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ScrapeConfig> {
    let toml_config = match &overrides.config_path {
        Some(path) => load_toml_config(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => load_toml_config(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                TomlConfig::default()
            }
        },
    };
    let toml_key = toml_config.ieee_api_key.clone();

    let env_preset = match std::env::var(ENV_PRESET) {
        Ok(value) if !value.trim().is_empty() => Some(value.parse::<Preset>()?),
        _ => None,
    };
    let preset = overrides.preset.or(env_preset);

    let mut config = ScrapeConfig::from_toml(toml_config, preset);

    if let Some(sources) = &overrides.sources {
        let mut sources: Vec<String> = sources
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        sources.sort();
        sources.dedup();
        config.enabled_sources = sources;
    }

    if let Some(n) = overrides.batch_concurrency {
        config.batch_concurrency = n.max(1);
    }

    config.ieee_api_key = resolve_ieee_api_key(
        overrides.ieee_api_key.as_deref(),
        std::env::var(ENV_IEEE_API_KEY).ok().as_deref(),
        toml_key.as_deref(),
    );

    info!(
        sources = %config.enabled_sources.join(","),
        ieee_key = config.ieee_api_key.is_some(),
        "Configuration resolved"
    );
    Ok(config)
}

/// Pick the IEEE API key by priority CLI → ENV → TOML
fn resolve_ieee_api_key(
    cli_key: Option<&str>,
    env_key: Option<&str>,
    toml_key: Option<&str>,
) -> Option<String> {
    let candidates = [
        ("command line", cli_key),
        ("environment", env_key),
        ("TOML", toml_key),
    ];
    let valid: Vec<(&str, &str)> = candidates
        .iter()
        .filter_map(|(origin, key)| key.filter(|k| is_valid_key(k)).map(|k| (*origin, k)))
        .collect();

    if valid.len() > 1 {
        warn!(
            "IEEE API key found in multiple sources: {}. Using {} (highest priority).",
            valid.iter().map(|(o, _)| *o).collect::<Vec<_>>().join(", "),
            valid[0].0
        );
    }

    valid.first().map(|(_, key)| key.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_uses_general_preset() {
        let config = ScrapeConfig::default();
        assert_eq!(
            config.enabled_sources,
            vec!["arxiv", "crossref", "dblp", "doi", "openreview", "pwc", "semanticscholar"]
        );
        assert_eq!(config.batch_concurrency, 4);
        assert!(config.ieee_api_key.is_none());
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("PHY".parse::<Preset>().unwrap(), Preset::Phy);
        assert!("biology".parse::<Preset>().is_err());
        assert_eq!(Preset::Es.to_string(), "es");
    }

    #[test]
    fn test_toggles_override_preset() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            preset = "phy"
            batch_concurrency = 0

            [sources]
            arxiv = false
            pubmed = true
            "#,
        )
        .unwrap();

        let config = ScrapeConfig::from_toml(toml_config, None);
        assert_eq!(config.enabled_sources, vec!["crossref", "doi", "pubmed", "semanticscholar"]);
        assert_eq!(config.batch_concurrency, 1, "Concurrency is clamped to 1");
    }

    #[test]
    fn test_ieee_key_priority() {
        assert_eq!(
            resolve_ieee_api_key(Some("cli"), Some("env"), Some("toml")),
            Some("cli".to_string())
        );
        assert_eq!(
            resolve_ieee_api_key(Some("   "), None, Some("toml")),
            Some("toml".to_string())
        );
        assert_eq!(resolve_ieee_api_key(None, None, None), None);
    }

    #[test]
    #[serial]
    fn test_resolve_config_from_file_and_env() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut file_config = TomlConfig::default();
        file_config.preset = Preset::Es;
        file_config.ieee_api_key = Some("toml-key".to_string());
        write_toml_config(&file_config, &path).unwrap();

        std::env::set_var(ENV_IEEE_API_KEY, "env-key");
        std::env::remove_var(ENV_PRESET);
        let config = resolve_config(&ConfigOverrides {
            config_path: Some(path.clone()),
            ..Default::default()
        })
        .unwrap();
        std::env::remove_var(ENV_IEEE_API_KEY);

        assert_eq!(config.enabled_sources, vec!["crossref", "doi", "semanticscholar"]);
        assert_eq!(config.ieee_api_key.as_deref(), Some("env-key"));
    }

    #[test]
    #[serial]
    fn test_cli_sources_bypass_preset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        write_toml_config(&TomlConfig::default(), &path).unwrap();
        std::env::remove_var(ENV_PRESET);

        let config = resolve_config(&ConfigOverrides {
            config_path: Some(path),
            sources: Some(vec!["DOI".to_string(), " ieee ".to_string(), "doi".to_string()]),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.enabled_sources, vec!["doi", "ieee"]);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let result = resolve_config(&ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/metascrape.toml")),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
