//! Click counters behind the "hot issues" list.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::persist::{read_json_records, write_json};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedArticle {
    pub link: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub clicks: u64,
    pub last_clicked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Click {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

pub struct ClickTracker {
    path: PathBuf,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl ClickTracker {
    pub fn new(path: impl Into<PathBuf>, retention_days: i64) -> Self {
        Self {
            path: path.into(),
            retention: Duration::days(retention_days),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn articles(&self) -> StoreResult<Vec<TrackedArticle>> {
        read_json_records(&self.path).await
    }

    pub async fn track(&self, click: Click) -> StoreResult<TrackedArticle> {
        self.track_at(click, Utc::now()).await
    }

    /// Increments the counter for `click.link`, inserting it on first click.
    pub async fn track_at(&self, click: Click, now: DateTime<Utc>) -> StoreResult<TrackedArticle> {
        if click.link.trim().is_empty() || click.title.trim().is_empty() {
            return Err(StoreError::invalid("Missing required fields"));
        }

        let _guard = self.write_lock.lock().await;
        let mut articles = self.articles().await?;
        let snippet = click.snippet.unwrap_or_default();

        let tracked = match articles.iter_mut().find(|a| a.link == click.link) {
            Some(existing) => {
                existing.clicks += 1;
                existing.last_clicked_at = now;
                existing.title = click.title;
                existing.snippet = snippet;
                existing.clone()
            }
            None => {
                let article = TrackedArticle {
                    link: click.link,
                    title: click.title,
                    snippet,
                    clicks: 1,
                    last_clicked_at: now,
                };
                articles.push(article.clone());
                article
            }
        };

        write_json(&self.path, &articles).await?;
        Ok(tracked)
    }

    pub async fn top_issues(&self, limit: usize) -> StoreResult<Vec<TrackedArticle>> {
        self.top_issues_at(limit, Utc::now()).await
    }

    /// Most-clicked articles, after dropping (and persisting the removal of)
    /// those idle longer than the retention window.
    pub async fn top_issues_at(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<TrackedArticle>> {
        let _guard = self.write_lock.lock().await;
        let articles = self.articles().await?;
        let cutoff = now - self.retention;

        let total = articles.len();
        let mut active: Vec<TrackedArticle> = articles
            .into_iter()
            .filter(|a| a.last_clicked_at >= cutoff)
            .collect();

        if active.len() < total {
            info!("Pruned {} stale tracked articles", total - active.len());
            write_json(&self.path, &active).await?;
        }

        active.sort_by(|a, b| {
            b.clicks
                .cmp(&a.clicks)
                .then_with(|| b.last_clicked_at.cmp(&a.last_clicked_at))
        });
        active.truncate(limit);
        Ok(active)
    }
}
