//! Labsite - backend for a research group website
//!
//! This crate serves the group's blog, staff pages and skills notes out of a
//! plain directory tree, and aggregates RSS feeds for the news page with a
//! click-based "hot issues" list. Everything is exposed as a JSON API under
//! `/api`.

pub mod config;
pub mod error;
pub mod feeds;
pub mod fetcher;
pub mod markdown;
pub mod naming;
pub mod persist;
pub mod posts;
pub mod routes;
pub mod skills;
pub mod tracking;
