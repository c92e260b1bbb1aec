//! Text helpers over markdown bodies: excerpts, image links, the script filter.

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};

const EXCERPT_FALLBACK_CHARS: usize = 200;
const LONG_SENTENCE_CHARS: usize = 100;

lazy_static! {
    static ref SENTENCE_REGEX: Regex = Regex::new(r"[^.!?]+[.!?]+").unwrap();
    static ref IMAGE_REF_REGEX: Regex = Regex::new(r"!\[([^\]]*)\]\(images/([^)]+)\)").unwrap();
}

/// Case-insensitive substring check for `<script` and `onerror`.
///
/// This is a tripwire, not a sanitizer.
pub fn contains_dangerous_content(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("<script") || lower.contains("onerror")
}

fn is_skipped_line(line: &str) -> bool {
    line.is_empty()
        || line.starts_with('#')
        || line.starts_with("![")
        || line.starts_with("```")
        || line.starts_with("- ")
        || line.starts_with("| ")
        || line.starts_with("> ")
}

/// First one or two sentences of body text, skipping headings, images,
/// code fences, lists, tables and quotes.
pub fn extract_excerpt(content: &str) -> String {
    let body: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !is_skipped_line(line))
        .take(2)
        .collect();

    if body.is_empty() {
        return String::new();
    }

    let full_text = body.join(" ");
    let sentences: Vec<&str> = SENTENCE_REGEX
        .find_iter(&full_text)
        .map(|m| m.as_str().trim())
        .collect();

    match sentences.first() {
        None => full_text.chars().take(EXCERPT_FALLBACK_CHARS).collect(),
        Some(first) if first.chars().count() > LONG_SENTENCE_CHARS => first.to_string(),
        Some(_) => sentences
            .iter()
            .take(2)
            .copied()
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Points `![alt](images/x)` at `{base_url}/x`.
pub fn rewrite_image_refs(content: &str, base_url: &str) -> String {
    let replacement = format!("![${{1}}]({}/${{2}})", base_url);
    IMAGE_REF_REGEX
        .replace_all(content, replacement.as_str())
        .into_owned()
}

/// Repoints markdown link targets naming an uploaded file at its stored name.
///
/// Only `](name)` and `](images/name)` are touched; the same text elsewhere
/// in the prose is left alone.
pub fn rewrite_upload_refs(content: &str, original: &str, stored: &str) -> String {
    let pattern = format!(r"\]\((?:images/)?{}\)", regex::escape(original));
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(_) => return content.to_string(),
    };
    let replacement = format!("](images/{})", stored);
    regex
        .replace_all(content, NoExpand(&replacement))
        .into_owned()
}
