//! Folder naming convention for posts: `{timestamp}_{tag}_{title}`.
//!
//! The 14-digit timestamp (`YYYYMMDDhhmmss`) sorts lexicographically in
//! chronological order. Tag and title are sanitized so they never contain
//! `_`, which keeps the name unambiguous to parse.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Characters allowed in a sanitized tag or title, besides `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    /// ASCII alphanumerics plus precomposed Hangul syllables
    AsciiHangul,
}

impl Charset {
    fn allows(self, c: char) -> bool {
        match self {
            Charset::Ascii => c.is_ascii_alphanumeric(),
            Charset::AsciiHangul => c.is_ascii_alphanumeric() || ('가'..='힣').contains(&c),
        }
    }
}

/// Whitespace runs become `-`, disallowed characters are dropped, repeated
/// dashes collapse and leading/trailing dashes are trimmed.
pub fn sanitize_segment(input: &str, charset: Charset) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if charset.allows(c) {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        }
    }

    out
}

pub fn timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `20260210093000` -> `Feb 10, 2026`. Unparseable input is returned as is.
pub fn format_date(raw: &str) -> String {
    raw.get(..8)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y%m%d").ok())
        .map(|date| date.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderName {
    pub timestamp: String,
    pub tag: String,
    pub title: String,
}

impl FolderName {
    pub fn new(timestamp: String, tag: String, title: String) -> Self {
        Self {
            timestamp,
            tag,
            title,
        }
    }

    /// Returns `None` for anything not following the convention, including
    /// soft-deleted (`_`-prefixed) folders.
    pub fn parse(name: &str) -> Option<Self> {
        lazy_static! {
            static ref FOLDER_REGEX: Regex = Regex::new(r"^(\d{14})_([^_]+)_(.+)$").unwrap();
        }

        let caps = FOLDER_REGEX.captures(name)?;
        Some(Self {
            timestamp: caps[1].to_string(),
            tag: caps[2].to_string(),
            title: caps[3].to_string(),
        })
    }

    pub fn slug(&self) -> String {
        self.title.to_lowercase()
    }

    pub fn matches_slug(&self, slug: &str) -> bool {
        self.slug() == slug.to_lowercase()
    }

    pub fn display_title(&self) -> String {
        self.title.replace('-', " ")
    }

    pub fn date(&self) -> String {
        format_date(&self.timestamp)
    }
}

impl fmt::Display for FolderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.timestamp, self.tag, self.title)
    }
}
