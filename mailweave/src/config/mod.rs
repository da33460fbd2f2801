use email_cleaner::{Normalizer, PatternFamily, PatternSet, ValidationRules};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{MailweaveError, Result};
use crate::services::resolver::{ThreadResolver, DEFAULT_SUBJECT_PREFIXES};

const APP_DIR: &str = "mailweave";

/// Runtime configuration. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub resolver: ResolverConfig,
    pub normalizer: NormalizerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Thread store selection and tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database file (default: `<data dir>/mailweave/threads.db`)
    pub path: Option<PathBuf>,

    /// Maximum pooled SQLite connections
    pub pool_size: u32,

    /// How long a writer waits for the database lock
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: None,
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Self::default()
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Configured path, or the default under the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR).join("threads.db"))
            .ok_or_else(|| {
                MailweaveError::Config("No data directory available for the thread store".into())
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Messages decoded and resolved concurrently
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub subject_prefixes: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            subject_prefixes: DEFAULT_SUBJECT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl ResolverConfig {
    pub fn build(&self) -> ThreadResolver {
        ThreadResolver::new(self.subject_prefixes.iter().cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub min_length: usize,

    /// Replaces the built-in boilerplate families when set
    pub families: Option<Vec<PatternFamily>>,

    /// Replaces the built-in whole-text rejection patterns when set
    pub invalid_patterns: Option<Vec<String>>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_length: ValidationRules::default().min_length,
            families: None,
            invalid_patterns: None,
        }
    }
}

impl NormalizerConfig {
    pub fn build(&self) -> Result<Normalizer> {
        let patterns = match &self.families {
            Some(families) => PatternSet {
                families: families.clone(),
            },
            None => PatternSet::builtin(),
        };
        let defaults = ValidationRules::default();
        let rules = ValidationRules {
            min_length: self.min_length,
            invalid_patterns: self
                .invalid_patterns
                .clone()
                .unwrap_or(defaults.invalid_patterns),
        };
        Ok(Normalizer::new(&patterns, &rules)?)
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| MailweaveError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = fs::read_to_string(path)
            .map_err(|e| MailweaveError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// First existing file among [`default_config_paths`], or defaults.
    pub fn load_or_default() -> Result<Self> {
        for path in default_config_paths() {
            if path.exists() {
                info!("Found config at: {:?}", path);
                return Self::load(&path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn default_path() -> Option<PathBuf> {
        default_config_paths().into_iter().next()
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.workers == 0 {
            return Err(MailweaveError::Config("ingest.workers must be at least 1".into()));
        }
        if self.store.pool_size == 0 {
            return Err(MailweaveError::Config("store.pool_size must be at least 1".into()));
        }
        if self.normalizer.min_length == 0 {
            return Err(MailweaveError::Config(
                "normalizer.min_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Candidate config locations, most specific first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(APP_DIR).join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join(APP_DIR).join("config.toml"));
    }

    paths
}
