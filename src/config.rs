//! Configuration for tzcheck.
//!
//! Settings come from `tzcheck.toml` (the `--config` path, the current
//! directory, then the data directory) with environment overrides applied on
//! top. Every field has a default, so an absent file is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::llm::LlmConfig;
use crate::pipeline::RunSettings;
use crate::repository::DbContext;
use crate::storage::FsObjectStore;

/// Name of the settings file.
pub const CONFIG_FILENAME: &str = "tzcheck.toml";

/// Default database filename inside the data directory.
const DEFAULT_DATABASE_FILENAME: &str = "tzcheck.db";

/// Default object store subdirectory name.
const OBJECTS_SUBDIR: &str = "objects";

/// Upstream service endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the DOCX to HTML converter.
    #[serde(default = "default_word_parser_url")]
    pub word_parser_url: String,
    #[serde(default = "default_conversion_timeout_secs")]
    pub word_parser_timeout_secs: u64,
    /// Base URL of the HTML to Markdown service.
    #[serde(default = "default_markdown_url")]
    pub markdown_url: String,
    #[serde(default = "default_conversion_timeout_secs")]
    pub markdown_timeout_secs: u64,
    /// Full URL of the prompt builder endpoint.
    #[serde(default = "default_prompt_builder_url")]
    pub prompt_builder_url: String,
    #[serde(default = "default_prompt_builder_timeout_secs")]
    pub prompt_builder_timeout_secs: u64,
    /// Base URL of the report generator. Reports are skipped when unset.
    #[serde(default)]
    pub report_generator_url: Option<String>,
    #[serde(default = "default_conversion_timeout_secs")]
    pub report_generator_timeout_secs: u64,
}

fn default_word_parser_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_markdown_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_prompt_builder_url() -> String {
    "http://localhost:8082/".to_string()
}

fn default_conversion_timeout_secs() -> u64 {
    300
}

fn default_prompt_builder_timeout_secs() -> u64 {
    60
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            word_parser_url: default_word_parser_url(),
            word_parser_timeout_secs: default_conversion_timeout_secs(),
            markdown_url: default_markdown_url(),
            markdown_timeout_secs: default_conversion_timeout_secs(),
            prompt_builder_url: default_prompt_builder_url(),
            prompt_builder_timeout_secs: default_prompt_builder_timeout_secs(),
            report_generator_url: None,
            report_generator_timeout_secs: default_conversion_timeout_secs(),
        }
    }
}

impl ServicesConfig {
    pub fn word_parser_timeout(&self) -> Duration {
        Duration::from_secs(self.word_parser_timeout_secs)
    }

    pub fn markdown_timeout(&self) -> Duration {
        Duration::from_secs(self.markdown_timeout_secs)
    }

    pub fn prompt_builder_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_builder_timeout_secs)
    }

    pub fn report_generator_timeout(&self) -> Duration {
        Duration::from_secs(self.report_generator_timeout_secs)
    }
}

/// Initial pipeline behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Starting value of the runtime ggID.
    #[serde(default = "default_gg_id")]
    pub gg_id: i64,
    #[serde(default)]
    pub use_llm_cache: bool,
    /// Render a DOCX report after each run.
    #[serde(default = "default_true")]
    pub render_report: bool,
}

fn default_gg_id() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gg_id: default_gg_id(),
            use_llm_cache: false,
            render_report: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store directory; defaults to `{data_dir}/objects`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// SQLite URL or path; overrides the data directory database.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default = "LlmConfig::base_default")]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_url: None,
            services: ServicesConfig::default(),
            llm: LlmConfig::base_default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Parse a settings file.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid tzcheck configuration")
    }

    /// Find and read the settings file, then apply environment overrides.
    ///
    /// An explicit `path` must exist. Otherwise the first of
    /// `./tzcheck.toml` and `{default data dir}/tzcheck.toml` is used, or the
    /// defaults if neither exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let candidates: Vec<PathBuf> = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("config file not found: {}", p.display());
                }
                vec![p.to_path_buf()]
            }
            None => vec![
                PathBuf::from(CONFIG_FILENAME),
                default_data_dir().join(CONFIG_FILENAME),
            ],
        };

        let config = match candidates.iter().find(|p| p.is_file()) {
            Some(found) => {
                tracing::debug!(path = %found.display(), "loading config");
                let text = fs::read_to_string(found)
                    .with_context(|| format!("failed to read {}", found.display()))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `TZCHECK_DATA_DIR`, `DATABASE_URL`
    /// - `WORD_PARSER_URL`, `MARKDOWN_SERVICE_URL`, `PROMPT_BUILDER_URL`,
    ///   `REPORT_GENERATOR_URL`
    /// - `TZ_GG_ID`, `TZ_USE_LLM_CACHE`
    /// - the `LLM_*` variables of [`LlmConfig::with_env_overrides`]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("TZCHECK_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.database_url = Some(val);
        }
        if let Ok(val) = std::env::var("WORD_PARSER_URL") {
            self.services.word_parser_url = val;
        }
        if let Ok(val) = std::env::var("MARKDOWN_SERVICE_URL") {
            self.services.markdown_url = val;
        }
        if let Ok(val) = std::env::var("PROMPT_BUILDER_URL") {
            self.services.prompt_builder_url = val;
        }
        if let Ok(val) = std::env::var("REPORT_GENERATOR_URL") {
            self.services.report_generator_url = Some(val).filter(|v| !v.is_empty());
        }
        if let Ok(val) = std::env::var("TZ_GG_ID") {
            if let Ok(n) = val.parse() {
                self.pipeline.gg_id = n;
            }
        }
        if let Ok(val) = std::env::var("TZ_USE_LLM_CACHE") {
            self.pipeline.use_llm_cache = matches!(val.as_str(), "1" | "true" | "yes");
        }
        self.llm = self.llm.with_env_overrides();
        self
    }
}

/// `~/Documents/tzcheck`, falling back to the home directory, then `.`.
pub fn default_data_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tzcheck")
}

/// Application settings resolved from a [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Explicit database URL, if configured.
    pub database_url: Option<String>,
    pub services: ServicesConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub storage_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(Config::default())
    }
}

impl Settings {
    pub fn from_config(config: Config) -> Self {
        let data_dir = config.data_dir.unwrap_or_else(default_data_dir);
        let storage_root = config
            .storage
            .root
            .unwrap_or_else(|| data_dir.join(OBJECTS_SUBDIR));
        Self {
            data_dir,
            database_url: config.database_url,
            services: config.services,
            llm: config.llm,
            pipeline: config.pipeline,
            storage_root,
        }
    }

    /// Load the settings file (see [`Config::load`]) and resolve it.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Config::load(path).map(Self::from_config)
    }

    /// Get the database URL, constructing from the data directory if not set.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    /// Create the data and object store directories.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [&self.data_dir, &self.storage_root] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                )
            })?;
        }
        Ok(())
    }

    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    pub fn object_store(&self) -> FsObjectStore {
        FsObjectStore::new(&self.storage_root)
    }

    /// Initial runtime settings for the coordinator.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            gg_id: self.pipeline.gg_id,
            use_llm_cache: self.pipeline.use_llm_cache,
        }
    }
}
