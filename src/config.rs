use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{LlmConfig, RetryPolicy};
use crate::models::{CategoryDef, CategorySet};
use crate::stages::{AggregateOptions, BatchConfig, RenderConfig, SystemicThresholds};

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "callsight.toml";

/// Subdirectory of the output dir for sample and single-call runs
pub const PREVIEW_SUBDIR: &str = "preview";

/// Where run artifacts go
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
}

impl PathsConfig {
    /// Output directory for a run
    ///
    /// Only checkpointed runs write to `output_dir` itself; other runs use the
    /// `preview` subdirectory so they never touch a resumable run's journal.
    pub fn run_output_dir(&self, checkpointed: bool) -> PathBuf {
        if checkpointed {
            self.output_dir.clone()
        } else {
            self.output_dir.join(PREVIEW_SUBDIR)
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

/// Top-level config file structure
///
/// Every section is optional. The API key is never read from here; see
/// [`LlmConfig::with_api_key_from_env`].
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub retry: RetryPolicy,
    pub batch: BatchConfig,
    pub aggregate: AggregateOptions,
    pub systemic: SystemicThresholds,
    pub render: RenderConfig,
    pub paths: PathsConfig,
    /// Replaces the built-in category catalogue when set
    pub categories: Option<Vec<CategoryDef>>,
}

impl AppConfig {
    /// Load from `path`, or from `callsight.toml` if it exists, else defaults
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(AppConfig::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        if config.batch.concurrency_limit == 0 {
            bail!("batch.concurrency_limit must be at least 1");
        }
        if config.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        Ok(config)
    }

    /// The configured categories, or the built-in catalogue
    pub fn category_set(&self) -> Result<CategorySet> {
        match &self.categories {
            Some(defs) => CategorySet::new(defs.clone()).context("Invalid categories in config"),
            None => Ok(CategorySet::default()),
        }
    }
}
