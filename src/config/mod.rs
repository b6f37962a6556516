//! Configuration module
//!
//! Lookup order: `FACTKEEP_CONFIG`, then `.factkeep/config.toml` walking up
//! from the working directory, then the global config in the user config
//! dir, then defaults. Database paths can be overridden with
//! `FACTKEEP_PROJECT_DB` and `FACTKEEP_GLOBAL_DB`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::embedding::{HashEmbedder, DEFAULT_EMBEDDING_DIM};
use crate::core::policy::PredicatePolicy;
use crate::core::recall::RecallSettings;
use crate::core::resolver::Resolver;
use crate::core::retry::RetryPolicy;

/// Name of the per-project directory
pub const DIR_NAME: &str = ".factkeep";

pub const ENV_CONFIG: &str = "FACTKEEP_CONFIG";
pub const ENV_PROJECT_DB: &str = "FACTKEEP_PROJECT_DB";
pub const ENV_GLOBAL_DB: &str = "FACTKEEP_GLOBAL_DB";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub recall: RecallConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Project file plus global file
    #[default]
    Dual,
    /// Every scope in the global file
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default)]
    pub mode: StoreMode,

    /// Defaults to `.factkeep/data.db` in the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_db: Option<PathBuf>,

    /// Defaults to `global.db` in the user data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_db: Option<PathBuf>,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::default(),
            project_db: None,
            global_db: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecallConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    #[serde(default = "default_semantic_candidate_cap")]
    pub semantic_candidate_cap: usize,

    #[serde(default = "default_concept_overfetch")]
    pub concept_overfetch: usize,

    #[serde(default = "default_text_score")]
    pub text_score: f32,

    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    #[serde(default = "default_explain_walk_limit")]
    pub explain_walk_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            overfetch_factor: default_overfetch_factor(),
            semantic_candidate_cap: default_semantic_candidate_cap(),
            concept_overfetch: default_concept_overfetch(),
            text_score: default_text_score(),
            min_similarity: default_min_similarity(),
            explain_walk_limit: default_explain_walk_limit(),
        }
    }
}

fn default_limit() -> usize {
    20
}

fn default_overfetch_factor() -> usize {
    RecallSettings::default().overfetch_factor
}

fn default_semantic_candidate_cap() -> usize {
    RecallSettings::default().semantic_candidate_cap
}

fn default_concept_overfetch() -> usize {
    RecallSettings::default().concept_overfetch
}

fn default_text_score() -> f32 {
    RecallSettings::default().text_score
}

fn default_min_similarity() -> f32 {
    RecallSettings::default().min_similarity
}

fn default_explain_walk_limit() -> usize {
    RecallSettings::default().explain_walk_limit
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Candidates below this confidence are stored as `proposed`
    #[serde(default = "default_activation_threshold")]
    pub activation_threshold: f32,

    /// Extra predicates that hold one active value per slot
    #[serde(default)]
    pub exclusive: Vec<String>,

    /// Extra predicates that accumulate values
    #[serde(default)]
    pub multi: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            activation_threshold: default_activation_threshold(),
            exclusive: Vec::new(),
            multi: Vec::new(),
        }
    }
}

fn default_activation_threshold() -> f32 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_jitter() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIM
}

impl Config {
    /// Load config from default locations
    ///
    /// `explicit` (the `--config` flag) wins over everything else.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(explicit) {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(ENV_CONFIG) {
            return Some(PathBuf::from(path));
        }
        if let Some(local) = Self::find_local_config() {
            return Some(local);
        }
        Self::global_config_path().filter(|p| p.exists())
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Database path overrides from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_PROJECT_DB).filter(|v| !v.is_empty()) {
            self.store.project_db = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_GLOBAL_DB).filter(|v| !v.is_empty()) {
            self.store.global_db = Some(PathBuf::from(path));
        }
    }

    /// Find local .factkeep/config.toml walking up directories
    pub fn find_local_config() -> Option<PathBuf> {
        let dir = find_project_root(&std::env::current_dir().ok()?)?;
        let config_path = dir.join(DIR_NAME).join("config.toml");
        config_path.exists().then_some(config_path)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.config_dir().join("config.toml"))
    }

    /// Project database for a project rooted at `root`.
    pub fn project_db_path(&self, root: &Path) -> PathBuf {
        self.store
            .project_db
            .clone()
            .unwrap_or_else(|| root.join(DIR_NAME).join("data.db"))
    }

    pub fn global_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store.global_db {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|d| d.data_dir().join("global.db"))
            .context("no home directory; set FACTKEEP_GLOBAL_DB")
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store.busy_timeout_ms)
    }

    pub fn recall_settings(&self) -> RecallSettings {
        RecallSettings {
            overfetch_factor: self.recall.overfetch_factor,
            semantic_candidate_cap: self.recall.semantic_candidate_cap,
            concept_overfetch: self.recall.concept_overfetch,
            text_score: self.recall.text_score,
            min_similarity: self.recall.min_similarity,
            explain_walk_limit: self.recall.explain_walk_limit,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(
            PredicatePolicy::with_overrides(&self.resolver.exclusive, &self.resolver.multi),
            self.resolver.activation_threshold,
        )
    }

    pub fn embedder(&self) -> HashEmbedder {
        HashEmbedder::new(self.embedding.dimension)
    }
}

/// Nearest directory at or above `start` holding a `.factkeep` dir.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(DIR_NAME).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "factkeep", "factkeep")
}
