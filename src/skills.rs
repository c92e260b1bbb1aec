//! Skills notes: a flat directory of `{title}.md` files.

use std::path::PathBuf;

use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::markdown::contains_dangerous_content;
use crate::persist::read_text_lossy;

const PAGE_ROUTE: &str = "/skills";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Skill {
    pub title: String,
    pub content: String,
}

pub struct SkillStore {
    root: PathBuf,
}

/// Keeps `[A-Za-z0-9-._ ]`, trims, and strips leading `_` so a new note can
/// never be born soft-deleted.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | ' '))
        .collect::<String>()
        .trim()
        .trim_start_matches('_')
        .trim()
        .to_string()
}

/// Titles used for lookup must name a live file directly inside the store.
fn is_lookup_title(title: &str) -> bool {
    !title.is_empty()
        && !title.starts_with('_')
        && title != "."
        && title != ".."
        && !title.contains(['/', '\\'])
}

impl SkillStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn initialize(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn path_for(&self, title: &str) -> PathBuf {
        self.root.join(format!("{}.md", title))
    }

    fn rejected() -> StoreError {
        StoreError::Rejected {
            redirect: PAGE_ROUTE.to_string(),
        }
    }

    /// Live skills sorted by title.
    pub async fn list(&self) -> StoreResult<Vec<Skill>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut skills = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(title) = name.to_str().and_then(|n| n.strip_suffix(".md")) else {
                continue;
            };
            if title.starts_with('_') || !entry.file_type().await?.is_file() {
                continue;
            }
            let content = read_text_lossy(&entry.path()).await?;
            skills.push(Skill {
                title: title.to_string(),
                content,
            });
        }

        skills.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(skills)
    }

    pub async fn get(&self, title: &str) -> StoreResult<Option<Skill>> {
        match self.read(title).await? {
            Some(bytes) => Ok(Some(Skill {
                title: title.to_string(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            })),
            None => Ok(None),
        }
    }

    /// Raw file bytes, for download.
    pub async fn read(&self, title: &str) -> StoreResult<Option<Vec<u8>>> {
        if !is_lookup_title(title) {
            return Ok(None);
        }
        match fs::read(self.path_for(title)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the sanitized title the note was stored under.
    pub async fn create(&self, title: &str, content: &str) -> StoreResult<String> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(StoreError::invalid("Title and content are required."));
        }
        if contains_dangerous_content(content) || contains_dangerous_content(title) {
            warn!("Rejected skill submission containing script content");
            return Err(Self::rejected());
        }

        let safe_title = sanitize_title(title);
        if !is_lookup_title(&safe_title) {
            return Err(StoreError::invalid("Invalid title."));
        }

        let path = self.path_for(&safe_title);
        if fs::try_exists(&path).await? {
            return Err(StoreError::conflict("Skill already exists."));
        }

        fs::write(&path, content).await?;
        info!("Created skill {}", safe_title);
        Ok(safe_title)
    }

    pub async fn edit(
        &self,
        original_title: &str,
        new_title: &str,
        content: &str,
    ) -> StoreResult<String> {
        if original_title.trim().is_empty()
            || new_title.trim().is_empty()
            || content.trim().is_empty()
        {
            return Err(StoreError::invalid("Missing fields."));
        }
        if contains_dangerous_content(content) || contains_dangerous_content(new_title) {
            warn!("Rejected skill edit containing script content");
            return Err(Self::rejected());
        }

        let safe_title = sanitize_title(new_title);
        if !is_lookup_title(&safe_title) {
            return Err(StoreError::invalid("Invalid title."));
        }

        if !is_lookup_title(original_title)
            || !fs::try_exists(self.path_for(original_title)).await?
        {
            return Err(StoreError::not_found("Original skill not found."));
        }

        let old_path = self.path_for(original_title);
        let new_path = self.path_for(&safe_title);
        if old_path != new_path {
            if fs::try_exists(&new_path).await? {
                return Err(StoreError::conflict("New title already exists."));
            }
            fs::rename(&old_path, &new_path).await?;
            info!("Renamed skill {} -> {}", original_title, safe_title);
        }

        fs::write(&new_path, content).await?;
        Ok(safe_title)
    }

    /// Soft delete: `{title}.md` becomes `_{title}.md`.
    pub async fn delete(&self, title: &str) -> StoreResult<()> {
        if !is_lookup_title(title) || !fs::try_exists(self.path_for(title)).await? {
            return Err(StoreError::not_found("Skill not found."));
        }

        let deleted = self.root.join(format!("_{}.md", title));
        if fs::try_exists(&deleted).await? {
            fs::remove_file(&deleted).await?;
        }
        fs::rename(self.path_for(title), deleted).await?;
        info!("Deleted skill {}", title);
        Ok(())
    }
}
