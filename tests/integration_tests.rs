//! Integration tests for the labsite backend
//!
//! These tests drive the full stack from configuration loading through the
//! HTTP API down to the files left in the content tree.

use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use labsite::config::Config;
use labsite::routes::{router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;

mod common {
    use super::*;

    /// Create a temporary content root
    pub fn create_temp_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp directory")
    }

    pub fn test_config(dir: &TempDir) -> Config {
        Config {
            content_dir: dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    pub async fn create_server(dir: &TempDir) -> (TestServer, Arc<AppState>) {
        let state = Arc::new(AppState::open(&test_config(dir)).await.unwrap());
        let server = TestServer::new(router(state.clone())).unwrap();
        (server, state)
    }

    /// Folder names directly under a section root
    pub fn folders(dir: &TempDir, section: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path().join(section))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn png_part(name: &str) -> Part {
        Part::bytes(vec![0x89, b'P', b'N', b'G'])
            .file_name(name)
            .mime_type("image/png")
    }
}

#[cfg(test)]
mod config_integration_tests {
    use super::*;

    #[test]
    fn test_load_actual_site_config() {
        // Test loading the actual site.toml from the project
        let config = Config::load("site.toml");
        assert!(config.is_ok(), "Failed to load site.toml: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.news.top_issues_limit, 2);
        assert!(config.max_upload_mb > 0);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = common::create_temp_dir();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.news.retention_days, 7);
    }

    #[tokio::test]
    async fn test_open_creates_layout() {
        let dir = common::create_temp_dir();
        AppState::open(&common::test_config(&dir)).await.unwrap();

        for section in ["BLOG", "STAFF", "SKILLS"] {
            assert!(dir.path().join(section).is_dir(), "{} missing", section);
        }
    }
}

#[cfg(test)]
mod blog_api_tests {
    use super::common::*;
    use super::*;

    #[tokio::test]
    async fn test_publish_edit_delete_workflow() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        // Publish with one image referenced by its upload name
        let form = MultipartForm::new()
            .add_text("title", "Fault Injection 101")
            .add_text("tag", "Research")
            .add_text(
                "content",
                "# Intro\n\nGlitching is fun. It is also cheap.\n\n![setup](setup.png)",
            )
            .add_part("images", png_part("setup.png"));
        let response = server.post("/api/blog/publish").multipart(form).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["redirect"], "/blog");
        assert_eq!(body["slug"], "fault-injection-101");

        let created = folders(&dir, "BLOG");
        assert_eq!(created.len(), 1);
        assert!(created[0].ends_with("_Research_Fault-Injection-101"));

        // Listing exposes excerpt, thumbnail and content
        let posts: Value = server.get("/api/blog/posts").await.json();
        let post = &posts[0];
        assert_eq!(post["title"], "Fault Injection 101");
        assert_eq!(post["excerpt"], "Glitching is fun. It is also cheap.");
        let thumbnail = post["thumbnail"].as_str().unwrap();
        assert!(thumbnail.starts_with("/api/blog-image/fault-injection-101/"));
        assert!(post["content"]
            .as_str()
            .unwrap()
            .contains("](/api/blog-image/fault-injection-101/"));

        // The stored image is served back
        let image = server.get(thumbnail).await;
        image.assert_status_ok();
        assert_eq!(image.as_bytes().to_vec(), vec![0x89, b'P', b'N', b'G']);

        // Edit: rename, drop the old image, add a new one
        let detail: Value = server.get("/api/blog/post/fault-injection-101").await.json();
        let old_image = detail["images"][0]["name"].as_str().unwrap().to_string();
        let form = MultipartForm::new()
            .add_text("slug", "fault-injection-101")
            .add_text("title", "Fault Injection 102")
            .add_text("tag", "Research")
            .add_text("content", "Second round.\n\n![probe](probe.png)")
            .add_text("deletedImages", json!([old_image]).to_string())
            .add_part("newImages", png_part("probe.png"));
        let response = server.post("/api/blog/edit").multipart(form).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["redirect"], "/blog/fault-injection-102");

        let renamed = folders(&dir, "BLOG");
        assert_eq!(renamed.len(), 1);
        assert_eq!(&renamed[0][..14], &created[0][..14], "timestamp must survive edits");

        let detail: Value = server.get("/api/blog/post/fault-injection-102").await.json();
        let images = detail["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_ne!(images[0]["name"], old_image.as_str());
        assert!(detail["rawContent"].as_str().unwrap().contains("](images/"));

        // Soft delete keeps the folder on disk
        let response = server
            .post("/api/blog/delete")
            .json(&json!({ "slug": "fault-injection-102" }))
            .await;
        response.assert_status_ok();

        let posts: Value = server.get("/api/blog/posts").await.json();
        assert_eq!(posts, json!([]));
        let remaining = folders(&dir, "BLOG");
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].starts_with('_'));
    }

    #[tokio::test]
    async fn test_script_content_redirects_without_writing() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        let form = MultipartForm::new()
            .add_text("title", "Innocent")
            .add_text("tag", "News")
            .add_text("content", "<img src=x onerror=alert(1)>");
        let response = server.post("/api/blog/publish").multipart(form).await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!({ "redirect": "/blog" }));
        assert!(folders(&dir, "BLOG").is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        let form = MultipartForm::new()
            .add_text("title", "No tag")
            .add_text("content", "Body.");
        let response = server.post("/api/blog/publish").multipart(form).await;

        response.assert_status_bad_request();
        assert!(folders(&dir, "BLOG").is_empty());
    }

    #[tokio::test]
    async fn test_non_image_upload_rejected() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        let form = MultipartForm::new()
            .add_text("title", "Payload")
            .add_text("tag", "News")
            .add_text("content", "Body.")
            .add_part(
                "images",
                Part::bytes(b"#!/bin/sh".to_vec()).file_name("run.sh"),
            );
        let response = server.post("/api/blog/publish").multipart(form).await;

        response.assert_status_bad_request();
        assert!(folders(&dir, "BLOG").is_empty());
    }
}

#[cfg(test)]
mod staff_api_tests {
    use super::common::*;
    use super::*;

    #[tokio::test]
    async fn test_hangul_title_and_hard_delete() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        let form = MultipartForm::new()
            .add_text("title", "연구실 소개")
            .add_text("tag", "Lab")
            .add_text("content", "Welcome to the lab.");
        let response = server.post("/api/staff/publish").multipart(form).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["redirect"], "/staff");
        let slug = body["slug"].as_str().unwrap().to_string();
        assert_eq!(slug, "연구실-소개");

        let response = server
            .post("/api/staff/delete")
            .json(&json!({ "slug": slug }))
            .await;
        response.assert_status_ok();

        assert!(folders(&dir, "STAFF").is_empty());
    }

    #[tokio::test]
    async fn test_sections_are_isolated() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        let form = MultipartForm::new()
            .add_text("title", "Only Staff")
            .add_text("tag", "Lab")
            .add_text("content", "Body.");
        server
            .post("/api/staff/publish")
            .multipart(form)
            .await
            .assert_status_ok();

        server
            .get("/api/blog/post/only-staff")
            .await
            .assert_status_not_found();
        server
            .get("/api/staff/post/only-staff")
            .await
            .assert_status_ok();
    }
}

#[cfg(test)]
mod skills_api_tests {
    use super::common::*;
    use super::*;

    #[tokio::test]
    async fn test_skill_lifecycle() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        server
            .post("/api/skills/publish")
            .json(&json!({ "title": "SPI Flash Dump", "content": "Use flashrom." }))
            .await
            .assert_status_ok();

        server
            .post("/api/skills/edit")
            .json(&json!({
                "originalTitle": "SPI Flash Dump",
                "newTitle": "SPI Dump",
                "content": "Use flashrom -r.",
            }))
            .await
            .assert_status_ok();

        let skills: Value = server.get("/api/skills/list").await.json();
        assert_eq!(
            skills,
            json!([{ "title": "SPI Dump", "content": "Use flashrom -r." }])
        );

        server
            .post("/api/skills/delete")
            .json(&json!({ "title": "SPI Dump" }))
            .await
            .assert_status_ok();

        let skills: Value = server.get("/api/skills/list").await.json();
        assert_eq!(skills, json!([]));
        assert!(dir.path().join("SKILLS").join("_SPI Dump.md").exists());
    }
}

#[cfg(test)]
mod news_api_tests {
    use super::common::*;
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>Hardware Hacking Digest</title>
                <link>https://digest.example.com</link>
                <description>news</description>
                <item>
                    <title>Older</title>
                    <link>https://digest.example.com/1</link>
                    <pubDate>Mon, 09 Dec 2024 10:00:00 GMT</pubDate>
                </item>
                <item>
                    <title>Newer</title>
                    <link>https://digest.example.com/2</link>
                    <pubDate>Tue, 10 Dec 2024 10:00:00 GMT</pubDate>
                </item>
            </channel>
        </rss>
    "#;

    #[tokio::test]
    async fn test_feed_registry_and_aggregation() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(RSS, "application/rss+xml"))
            .mount(&mock)
            .await;

        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;
        let feed_url = format!("{}/feed.xml", mock.uri());

        server
            .post("/api/news/feeds")
            .json(&json!({ "url": feed_url }))
            .await
            .assert_status_ok();
        let duplicate = server
            .post("/api/news/feeds")
            .json(&json!({ "url": feed_url }))
            .await;
        assert_eq!(duplicate.status_code(), 409);

        let feeds: Value = server.get("/api/news/feeds").await.json();
        assert_eq!(feeds, json!([feed_url]));
        let on_disk = std::fs::read_to_string(dir.path().join("rss.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&on_disk).unwrap(), json!([feed_url]));

        let articles: Value = server.get("/api/news/articles").await.json();
        assert_eq!(articles[0]["title"], "Newer");
        assert_eq!(articles[1]["title"], "Older");
        assert_eq!(articles[0]["source"], "Hardware Hacking Digest");
        assert_eq!(articles[0]["feedUrl"], feed_url.as_str());

        let single: Value = server
            .get("/api/news/articles")
            .add_query_param("url", &feed_url)
            .await
            .json();
        assert_eq!(single.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clicks_feed_top_issues() {
        let dir = create_temp_dir();
        let (server, _state) = create_server(&dir).await;

        for (link, times) in [("https://a.com", 1), ("https://b.com", 3), ("https://c.com", 2)] {
            for _ in 0..times {
                server
                    .post("/api/news/click")
                    .json(&json!({ "link": link, "title": link, "snippet": "" }))
                    .await
                    .assert_status_ok();
            }
        }

        let top: Value = server.get("/api/news/top-issues").await.json();
        let top = top.as_array().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["link"], "https://b.com");
        assert_eq!(top[0]["clicks"], 3);
        assert_eq!(top[1]["link"], "https://c.com");

        assert!(dir.path().join("News").join("hot_issues.json").exists());
    }
}
