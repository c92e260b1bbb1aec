//! File-backed post repository shared by the blog and staff sections.
//!
//! Layout under the store root:
//!
//! ```text
//! {timestamp}_{tag}_{title}/
//!     {uuid}.md
//!     images/{uuid}.{ext}
//! ```

use std::path::{Component, Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::markdown::{
    contains_dangerous_content, extract_excerpt, rewrite_image_refs, rewrite_upload_refs,
};
use crate::naming::{sanitize_segment, timestamp, Charset, FolderName};
use crate::persist::read_text_lossy;

const IMAGES_DIR: &str = "images";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Rename the folder with a `_` prefix
    Soft,
    /// Remove the folder recursively
    Hard,
}

/// What differs between the blog and staff sections.
#[derive(Debug, Clone, Copy)]
pub struct Flavor {
    pub name: &'static str,
    pub image_route: &'static str,
    pub page_route: &'static str,
    pub charset: Charset,
    pub delete_mode: DeleteMode,
}

impl Flavor {
    pub const BLOG: Flavor = Flavor {
        name: "blog",
        image_route: "/api/blog-image",
        page_route: "/blog",
        charset: Charset::Ascii,
        delete_mode: DeleteMode::Soft,
    };

    pub const STAFF: Flavor = Flavor {
        name: "staff",
        image_route: "/api/staff-image",
        page_route: "/staff",
        charset: Charset::AsciiHangul,
        delete_mode: DeleteMode::Hard,
    };

    pub fn image_url(&self, slug: &str, file: &str) -> String {
        format!("{}/{}/{}", self.image_route, slug, file)
    }
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub tag: String,
    pub content: String,
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub date: String,
    pub raw_date: String,
    pub tag: String,
    pub excerpt: String,
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub struct PostStore {
    root: PathBuf,
    flavor: Flavor,
}

fn is_image_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// A single path component with no separators or dot-dirs.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl PostStore {
    pub fn new(root: impl Into<PathBuf>, flavor: Flavor) -> Self {
        Self {
            root: root.into(),
            flavor,
        }
    }

    pub fn flavor(&self) -> &Flavor {
        &self.flavor
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn initialize(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// All live posts, newest first. Ties on timestamp fall back to folder
    /// name so repeated listings come back in the same order.
    pub async fn list(&self) -> StoreResult<Vec<Post>> {
        self.collect_posts(false).await
    }

    /// Like [`PostStore::list`], with each post's content filled in.
    pub async fn list_with_content(&self) -> StoreResult<Vec<Post>> {
        self.collect_posts(true).await
    }

    async fn collect_posts(&self, with_content: bool) -> StoreResult<Vec<Post>> {
        let mut posts = Vec::new();
        for folder in self.live_folders().await? {
            if let Some(post) = self.load_post(&folder, with_content).await? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    pub async fn get(&self, slug: &str) -> StoreResult<Option<Post>> {
        match self.find_folder(slug).await? {
            Some(folder) => self.load_post(&folder, true).await,
            None => Ok(None),
        }
    }

    /// Markdown as stored on disk, without image links rewritten.
    pub async fn raw_content(&self, slug: &str) -> StoreResult<Option<String>> {
        let Some(folder) = self.find_folder(slug).await? else {
            return Ok(None);
        };
        match Self::find_markdown(&self.folder_path(&folder)).await? {
            Some(md) => Ok(Some(read_text_lossy(&md).await?)),
            None => Ok(None),
        }
    }

    /// Image file names of a post, sorted.
    pub async fn images(&self, slug: &str) -> StoreResult<Vec<String>> {
        match self.find_folder(slug).await? {
            Some(folder) => Self::list_images(&self.folder_path(&folder)).await,
            None => Ok(Vec::new()),
        }
    }

    /// Resolves an image of a post to a file under the store root.
    pub async fn image_path(&self, slug: &str, file: &str) -> StoreResult<PathBuf> {
        let folder = self
            .find_folder(slug)
            .await?
            .ok_or_else(|| StoreError::not_found("Post not found"))?;

        if Path::new(file)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::Forbidden);
        }

        let candidate = self.folder_path(&folder).join(IMAGES_DIR).join(file);
        let resolved = fs::canonicalize(&candidate)
            .await
            .map_err(|_| StoreError::not_found("File not found"))?;
        let root = fs::canonicalize(&self.root).await?;
        if !resolved.starts_with(&root) {
            return Err(StoreError::Forbidden);
        }
        if !fs::metadata(&resolved).await?.is_file() {
            return Err(StoreError::not_found("File not found"));
        }

        Ok(resolved)
    }

    pub async fn create(&self, draft: PostDraft) -> StoreResult<String> {
        self.create_at(draft, Local::now().naive_local()).await
    }

    /// Creates a post stamped with `at`. Returns its slug.
    pub async fn create_at(&self, draft: PostDraft, at: NaiveDateTime) -> StoreResult<String> {
        let (tag, title) = self.validate(&draft)?;
        let folder = FolderName::new(timestamp(at), tag, title);
        let slug = folder.slug();
        let folder_path = self.folder_path(&folder);

        if self.find_folder(&slug).await?.is_some() || fs::try_exists(&folder_path).await? {
            return Err(StoreError::conflict("Post already exists."));
        }

        fs::create_dir_all(folder_path.join(IMAGES_DIR)).await?;

        if let Err(e) = Self::write_new_post(&folder_path, &draft.images, draft.content).await {
            warn!("Rolling back partially created {} post {}", self.flavor.name, folder);
            let _ = fs::remove_dir_all(&folder_path).await;
            return Err(e);
        }

        info!("Created {} post {}", self.flavor.name, folder);
        Ok(slug)
    }

    /// Rewrites a post, keeping its original timestamp. Returns the new slug.
    pub async fn edit(
        &self,
        slug: &str,
        draft: PostDraft,
        deleted_images: &[String],
    ) -> StoreResult<String> {
        let (tag, title) = self.validate(&draft)?;

        let old = self
            .find_folder(slug)
            .await?
            .ok_or_else(|| StoreError::not_found("Post not found."))?;
        let new = FolderName::new(old.timestamp.clone(), tag, title);
        let new_slug = new.slug();

        if new_slug != old.slug() && self.find_folder(&new_slug).await?.is_some() {
            return Err(StoreError::conflict("A post with this title already exists."));
        }

        let folder_path = self.folder_path(&new);
        if new != old {
            fs::rename(self.folder_path(&old), &folder_path).await?;
            info!("Renamed {} post {} -> {}", self.flavor.name, old, new);
        }

        let images_dir = folder_path.join(IMAGES_DIR);
        fs::create_dir_all(&images_dir).await?;

        for name in deleted_images {
            if !is_plain_file_name(name) {
                warn!("Ignoring suspicious image name in delete list: {}", name);
                continue;
            }
            match fs::remove_file(images_dir.join(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let content = Self::store_images(&images_dir, &draft.images, draft.content).await?;
        let md_path = match Self::find_markdown(&folder_path).await? {
            Some(existing) => existing,
            None => folder_path.join(format!("{}.md", Uuid::new_v4())),
        };
        fs::write(md_path, content).await?;

        info!("Edited {} post {}", self.flavor.name, new);
        Ok(new_slug)
    }

    pub async fn delete(&self, slug: &str) -> StoreResult<()> {
        let folder = self
            .find_folder(slug)
            .await?
            .ok_or_else(|| StoreError::not_found("Post not found."))?;
        let path = self.folder_path(&folder);

        match self.flavor.delete_mode {
            DeleteMode::Soft => {
                let target = self.root.join(format!("_{}", folder));
                if fs::try_exists(&target).await? {
                    return Err(StoreError::conflict("A deleted copy already exists."));
                }
                fs::rename(&path, &target).await?;
            }
            DeleteMode::Hard => fs::remove_dir_all(&path).await?,
        }

        info!("Deleted {} post {}", self.flavor.name, folder);
        Ok(())
    }

    fn folder_path(&self, folder: &FolderName) -> PathBuf {
        self.root.join(folder.to_string())
    }

    /// Checks required fields and the script filter, then sanitizes.
    /// Returns `(tag, title)`.
    fn validate(&self, draft: &PostDraft) -> StoreResult<(String, String)> {
        if draft.title.trim().is_empty()
            || draft.tag.trim().is_empty()
            || draft.content.trim().is_empty()
        {
            return Err(StoreError::invalid("Title, tag, and content are required."));
        }

        if contains_dangerous_content(&draft.content) || contains_dangerous_content(&draft.title) {
            warn!("Rejected {} submission containing script content", self.flavor.name);
            return Err(StoreError::Rejected {
                redirect: self.flavor.page_route.to_string(),
            });
        }

        let tag = sanitize_segment(&draft.tag, self.flavor.charset);
        let title = sanitize_segment(&draft.title, self.flavor.charset);
        if tag.is_empty() || title.is_empty() {
            return Err(StoreError::invalid(
                "Title and tag must contain letters or digits.",
            ));
        }

        for image in &draft.images {
            if !is_image_file(&image.file_name) && Path::new(&image.file_name).extension().is_some()
            {
                return Err(StoreError::invalid(format!(
                    "Unsupported image type: {}",
                    image.file_name
                )));
            }
        }

        Ok((tag, title))
    }

    async fn write_new_post(
        folder_path: &Path,
        images: &[ImageUpload],
        content: String,
    ) -> StoreResult<()> {
        let content = Self::store_images(&folder_path.join(IMAGES_DIR), images, content).await?;
        let md_path = folder_path.join(format!("{}.md", Uuid::new_v4()));
        fs::write(md_path, content).await?;
        Ok(())
    }

    /// Writes uploads under random names and repoints markdown links at them.
    async fn store_images(
        images_dir: &Path,
        images: &[ImageUpload],
        mut content: String,
    ) -> StoreResult<String> {
        for image in images {
            let original = Path::new(&image.file_name)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&image.file_name);
            let ext = Path::new(original)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .unwrap_or_else(|| "png".to_string());
            let stored = format!("{}.{}", Uuid::new_v4(), ext);

            fs::write(images_dir.join(&stored), &image.bytes).await?;
            content = rewrite_upload_refs(&content, original, &stored);
        }
        Ok(content)
    }

    async fn live_folders(&self) -> StoreResult<Vec<FolderName>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(folder) = name.to_str().and_then(FolderName::parse) {
                folders.push(folder);
            }
        }

        folders.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.to_string().cmp(&b.to_string()))
        });
        Ok(folders)
    }

    /// Newest live folder whose title segment matches `slug`.
    async fn find_folder(&self, slug: &str) -> StoreResult<Option<FolderName>> {
        Ok(self
            .live_folders()
            .await?
            .into_iter()
            .find(|folder| folder.matches_slug(slug)))
    }

    async fn find_markdown(folder_path: &Path) -> StoreResult<Option<PathBuf>> {
        let mut entries = fs::read_dir(folder_path).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md")
                && entry.file_type().await?.is_file()
            {
                found.push(path);
            }
        }
        found.sort();
        Ok(found.into_iter().next())
    }

    async fn list_images(folder_path: &Path) -> StoreResult<Vec<String>> {
        let mut entries = match fs::read_dir(folder_path.join(IMAGES_DIR)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_image_file(name) {
                    images.push(name.to_string());
                }
            }
        }
        images.sort();
        Ok(images)
    }

    async fn load_post(
        &self,
        folder: &FolderName,
        with_content: bool,
    ) -> StoreResult<Option<Post>> {
        let folder_path = self.folder_path(folder);
        let Some(md) = Self::find_markdown(&folder_path).await? else {
            return Ok(None);
        };
        let raw = read_text_lossy(&md).await?;
        let slug = folder.slug();

        let thumbnail = Self::list_images(&folder_path)
            .await?
            .first()
            .map(|image| self.flavor.image_url(&slug, image));

        let content = with_content.then(|| {
            let base = format!("{}/{}", self.flavor.image_route, slug);
            rewrite_image_refs(&raw, &base)
        });

        Ok(Some(Post {
            title: folder.display_title(),
            date: folder.date(),
            raw_date: folder.timestamp.clone(),
            tag: folder.tag.clone(),
            excerpt: extract_excerpt(&raw),
            thumbnail,
            content,
            slug,
        }))
    }
}
