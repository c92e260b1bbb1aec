use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::config::NewsConfig;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub link: String,
    pub pub_date: Option<String>,
    pub iso_date: Option<String>,
    pub snippet: String,
    pub source: String,
    pub feed_url: String,
    #[serde(skip)]
    pub published: Option<DateTime<Utc>>,
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &NewsConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Fetches every feed concurrently and merges the entries, newest first.
    /// Feeds that fail to download or parse are logged and left out.
    pub async fn fetch_articles(&self, urls: &[String]) -> Vec<Article> {
        let results = join_all(urls.iter().map(|url| self.fetch_feed(url))).await;

        let mut articles = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(mut items) => articles.append(&mut items),
                Err(e) => error!("Failed to parse feed {}: {}", url, e),
            }
        }

        sort_articles(&mut articles);
        info!("Aggregated {} articles from {} feeds", articles.len(), urls.len());
        articles
    }

    async fn fetch_feed(&self, url: &str) -> anyhow::Result<Vec<Article>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let parsed = parser::parse(&bytes[..])?;
        Ok(Self::articles_from_feed(parsed, url))
    }

    pub fn articles_from_feed(feed: feed_rs::model::Feed, feed_url: &str) -> Vec<Article> {
        let source = feed
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| feed_url.to_string());

        let mut articles = Vec::new();
        for entry in feed.entries {
            let link = match entry.links.first() {
                Some(link) if !link.href.is_empty() => link.href.clone(),
                _ => continue,
            };

            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "Untitled".to_string());

            let snippet = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
                .map(|text| strip_html(&text))
                .unwrap_or_default();

            let published = entry.published.or(entry.updated);

            articles.push(Article {
                title,
                link,
                pub_date: published.map(|dt| dt.to_rfc2822()),
                iso_date: published.map(|dt| dt.to_rfc3339()),
                snippet,
                source: source.clone(),
                feed_url: feed_url.to_string(),
                published,
            });
        }

        articles
    }
}

/// Descending by date; undated articles count as the epoch.
pub fn sort_articles(articles: &mut [Article]) {
    articles.sort_by_key(|a| std::cmp::Reverse(a.published.map(|p| p.timestamp()).unwrap_or(0)));
}

/// Drops markup and collapses whitespace.
pub fn strip_html(text: &str) -> String {
    lazy_static! {
        static ref TAG_REGEX: Regex = Regex::new(r"<[^>]*>").unwrap();
    }

    TAG_REGEX
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
