use serde::Deserialize;
use std::path::{Path, PathBuf};

use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Root of the content tree (BLOG/, STAFF/, SKILLS/, rss.json, News/)
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Request body limit for multipart uploads, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default)]
    pub news: NewsConfig,
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("Contents")
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_upload_mb() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    #[serde(default = "default_top_issues_limit")]
    pub top_issues_limit: usize,
    /// Tracked articles idle for longer than this are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_top_issues_limit() -> usize {
    2
}

fn default_retention_days() -> i64 {
    7
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "labsite/0.1 (RSS Aggregator)".to_string()
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            top_issues_limit: default_top_issues_limit(),
            retention_days: default_retention_days(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            bind_addr: default_bind_addr(),
            max_upload_mb: default_max_upload_mb(),
            news: NewsConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    /// A file that exists and fails to parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn blog_dir(&self) -> PathBuf {
        self.content_dir.join("BLOG")
    }

    pub fn staff_dir(&self) -> PathBuf {
        self.content_dir.join("STAFF")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.content_dir.join("SKILLS")
    }

    pub fn feeds_file(&self) -> PathBuf {
        self.content_dir.join("rss.json")
    }

    pub fn tracking_file(&self) -> PathBuf {
        self.content_dir.join("News").join("hot_issues.json")
    }
}
