//! TOML configuration.
//!
//! ```toml
//! [site]
//! root = "./public"
//! host = "localhost"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [search]
//! endpoint = "/search"
//! include = ["^/"]
//! exclude = ["^/private/"]
//! index_dir = "/tmp/sitesearch-index"
//! engine = "tantivy"
//! expire_secs = 60
//! crawl = true
//!
//! [log]
//! level = "info"
//! ```
//!
//! Every section except `[site]` may be omitted.

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sitesearch_core::policy::MATCH_ALL;
use sitesearch_core::PathPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub root: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Result page template, relative to `site.root`.
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
    #[serde(default = "default_crawl")]
    pub crawl: bool,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            include: Vec::new(),
            exclude: Vec::new(),
            index_dir: default_index_dir(),
            engine: default_engine(),
            template: None,
            expire_secs: default_expire_secs(),
            crawl: default_crawl(),
            result_limit: default_result_limit(),
            queue_capacity: default_queue_capacity(),
            pool_capacity: default_pool_capacity(),
        }
    }
}

fn default_endpoint() -> String {
    "/search".to_string()
}
fn default_index_dir() -> PathBuf {
    std::env::temp_dir().join("sitesearch-index")
}
fn default_engine() -> String {
    "tantivy".to_string()
}
fn default_expire_secs() -> u64 {
    60
}
fn default_crawl() -> bool {
    true
}
fn default_result_limit() -> usize {
    50
}
fn default_queue_capacity() -> usize {
    1
}
fn default_pool_capacity() -> usize {
    sitesearch_core::pool::DEFAULT_POOL_CAPACITY
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// All-defaults configuration serving `root`.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        Self {
            site: SiteConfig {
                root: root.into(),
                host: default_host(),
            },
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Index location for this host: `index_dir/<sha256(host) in hex>`.
    pub fn index_path(&self) -> PathBuf {
        let digest = Sha256::digest(self.site.host.as_bytes());
        self.search.index_dir.join(hex::encode(digest))
    }

    /// Compiled include/exclude policy; an empty include list becomes `^/`.
    pub fn path_policy(&self) -> PathPolicy {
        if self.search.include.is_empty() {
            PathPolicy::compile(&[MATCH_ALL.to_string()], &self.search.exclude)
        } else {
            PathPolicy::compile(&self.search.include, &self.search.exclude)
        }
    }

    pub fn expire_interval(&self) -> Duration {
        Duration::from_secs(self.search.expire_secs)
    }

    /// Absolute template path, if one is configured.
    pub fn template_path(&self) -> Option<PathBuf> {
        self.search
            .template
            .as_ref()
            .map(|t| self.site.root.join(t))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Relative site roots are resolved against the config file's directory.
    if config.site.root.is_relative() {
        if let Some(dir) = path.parent() {
            config.site.root = dir.join(&config.site.root);
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !config.site.root.is_dir() {
        anyhow::bail!(
            "site.root is not a directory: {}",
            config.site.root.display()
        );
    }

    if config.site.host.trim().is_empty() {
        anyhow::bail!("site.host must not be empty");
    }

    if !config.search.endpoint.starts_with('/') {
        anyhow::bail!(
            "search.endpoint must start with '/': '{}'",
            config.search.endpoint
        );
    }

    if config.search.endpoint == "/health" {
        anyhow::bail!("search.endpoint must not be /health");
    }

    if config.search.expire_secs == 0 {
        anyhow::bail!("search.expire_secs must be > 0");
    }

    if config.search.result_limit < 1 {
        anyhow::bail!("search.result_limit must be >= 1");
    }

    if config.search.queue_capacity < 1 {
        anyhow::bail!("search.queue_capacity must be >= 1");
    }

    if let Some(template) = config.template_path() {
        if !template.is_file() {
            anyhow::bail!("search.template not found: {}", template.display());
        }
    }

    Ok(())
}
