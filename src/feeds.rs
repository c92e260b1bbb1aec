//! Registry of RSS feed URLs, persisted as a JSON array.

use std::path::PathBuf;

use reqwest::Url;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::persist::{read_json_records, write_json};

pub struct FeedRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn validate_url(url: &str) -> StoreResult<()> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(StoreError::invalid("URL must be an absolute http(s) address")),
    }
}

impl FeedRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> StoreResult<Vec<String>> {
        read_json_records(&self.path).await
    }

    pub async fn add(&self, url: &str) -> StoreResult<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(StoreError::invalid("URL is required"));
        }
        validate_url(url)?;

        let _guard = self.write_lock.lock().await;
        let mut feeds = self.list().await?;
        if feeds.iter().any(|f| f == url) {
            return Err(StoreError::conflict("Feed already exists"));
        }

        feeds.push(url.to_string());
        write_json(&self.path, &feeds).await?;
        info!("Added feed {}", url);
        Ok(())
    }

    pub async fn remove(&self, url: &str) -> StoreResult<()> {
        let url = url.trim();
        let _guard = self.write_lock.lock().await;
        let feeds = self.list().await?;
        let remaining: Vec<String> = feeds.iter().filter(|f| *f != url).cloned().collect();

        if remaining.len() == feeds.len() {
            return Err(StoreError::not_found("Feed not found"));
        }

        write_json(&self.path, &remaining).await?;
        info!("Removed feed {}", url);
        Ok(())
    }
}
