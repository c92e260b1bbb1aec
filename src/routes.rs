use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        Query, State,
    },
    http::{
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::Config;
use crate::error::StoreError;
use crate::feeds::FeedRegistry;
use crate::fetcher::Fetcher;
use crate::posts::{Flavor, ImageUpload, Post, PostDraft, PostStore};
use crate::skills::SkillStore;
use crate::tracking::{Click, ClickTracker};

pub struct AppState {
    pub blog: PostStore,
    pub staff: PostStore,
    pub skills: SkillStore,
    pub feeds: FeedRegistry,
    pub tracker: ClickTracker,
    pub fetcher: Fetcher,
    pub top_issues_limit: usize,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Opens every store under the configured content root, creating
    /// directories as needed.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let blog = PostStore::new(config.blog_dir(), Flavor::BLOG);
        let staff = PostStore::new(config.staff_dir(), Flavor::STAFF);
        let skills = SkillStore::new(config.skills_dir());

        blog.initialize().await?;
        staff.initialize().await?;
        skills.initialize().await?;

        Ok(Self {
            blog,
            staff,
            skills,
            feeds: FeedRegistry::new(config.feeds_file()),
            tracker: ClickTracker::new(config.tracking_file(), config.news.retention_days),
            fetcher: Fetcher::new(&config.news)?,
            top_issues_limit: config.news.top_issues_limit,
            max_upload_bytes: config.max_upload_mb * 1024 * 1024,
        })
    }

    fn posts(&self, section: Section) -> &PostStore {
        match section {
            Section::Blog => &self.blog,
            Section::Staff => &self.staff,
        }
    }
}

/// Which post store a nested router serves.
#[derive(Debug, Clone, Copy)]
pub enum Section {
    Blog,
    Staff,
}

/// Routes shared by the blog and staff sections; the `Section` extension
/// picks the store.
fn post_routes(section: Section) -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/post/:slug", get(get_post))
        .route("/publish", post(publish_post))
        .route("/edit", post(edit_post))
        .route("/delete", post(delete_post))
        .layer(Extension(section))
}

pub fn router(state: Arc<AppState>) -> Router {
    let skill_routes = Router::new()
        .route("/list", get(list_skills))
        .route("/get", get(get_skill))
        .route("/download", get(download_skill))
        .route("/publish", post(publish_skill))
        .route("/edit", post(edit_skill))
        .route("/delete", post(delete_skill));

    let news_routes = Router::new()
        .route("/feeds", get(list_feeds).post(add_feed).delete(remove_feed))
        .route("/articles", get(articles))
        .route("/click", post(track_click))
        .route("/top-issues", get(top_issues));

    Router::new()
        .route("/health", get(health))
        .nest("/api/blog", post_routes(Section::Blog))
        .nest("/api/staff", post_routes(Section::Staff))
        .route(
            "/api/blog-image/:slug/*file",
            get(serve_image).layer(Extension(Section::Blog)),
        )
        .route(
            "/api/staff-image/:slug/*file",
            get(serve_image).layer(Extension(Section::Staff)),
        )
        .nest("/api/skills", skill_routes)
        .nest("/api/news", news_routes)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Custom error type
pub enum AppError {
    Store(StoreError),
    BadRequest(String),
    Internal(anyhow::Error),
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Store(StoreError::Rejected { redirect }) => {
                (StatusCode::OK, Json(json!({ "redirect": redirect }))).into_response()
            }
            AppError::Store(StoreError::Invalid(msg)) | AppError::BadRequest(msg) => {
                error_body(StatusCode::BAD_REQUEST, msg)
            }
            AppError::Store(StoreError::NotFound(msg)) => error_body(StatusCode::NOT_FOUND, msg),
            AppError::Store(StoreError::Conflict(msg)) => error_body(StatusCode::CONFLICT, msg),
            AppError::Store(StoreError::Forbidden) => {
                error_body(StatusCode::FORBIDDEN, "Forbidden")
            }
            AppError::Store(err) => {
                error!("Request failed: {}", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
            AppError::Internal(err) => {
                error!("Request failed: {:#}", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(_: JsonRejection) -> Self {
        AppError::BadRequest("Invalid request".to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Invalid form data: {}", err.body_text()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

fn success(redirect: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "redirect": redirect.into() }))
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

// Blog and staff posts

#[derive(Default)]
pub struct PostForm {
    pub slug: String,
    pub title: String,
    pub tag: String,
    pub content: String,
    pub images: Vec<ImageUpload>,
    pub deleted_images: Vec<String>,
}

impl PostForm {
    fn into_draft(self) -> (String, PostDraft, Vec<String>) {
        let draft = PostDraft {
            title: self.title,
            tag: self.tag,
            content: self.content,
            images: self.images,
        };
        (self.slug, draft, self.deleted_images)
    }
}

/// Reads the publish/edit form. Uploads arrive as `images` (publish) or
/// `newImages` (edit); `deletedImages` is a JSON array of file names.
pub async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "slug" => form.slug = field.text().await?,
            "title" => form.title = field.text().await?,
            "tag" => form.tag = field.text().await?,
            "content" => form.content = field.text().await?,
            "images" | "newImages" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                let file_name = if file_name.trim().is_empty() {
                    "upload.png".to_string()
                } else {
                    file_name
                };
                form.images.push(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "deletedImages" => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    form.deleted_images = serde_json::from_str(&raw).map_err(|_| {
                        AppError::BadRequest("deletedImages must be a JSON array".to_string())
                    })?;
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

#[derive(Serialize)]
pub struct ImageRef {
    pub name: String,
    pub url: String,
}

/// A post as the editor loads it. `content` is the markdown as stored, with
/// `images/...` links left alone so saving it back round-trips.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub raw_content: String,
    pub images: Vec<ImageRef>,
}

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Extension(section): Extension<Section>,
) -> Result<impl IntoResponse, AppError> {
    let posts = state.posts(section).list_with_content().await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Extension(section): Extension<Section>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.posts(section);
    let mut post = store
        .get(&slug)
        .await?
        .ok_or_else(|| StoreError::not_found("Post not found."))?;

    let raw_content = store.raw_content(&slug).await?.unwrap_or_default();
    post.content = Some(raw_content.clone());
    let images = store
        .images(&slug)
        .await?
        .into_iter()
        .map(|name| ImageRef {
            url: store.flavor().image_url(&post.slug, &name),
            name,
        })
        .collect();

    Ok(Json(PostDetail {
        post,
        raw_content,
        images,
    }))
}

pub async fn publish_post(
    State(state): State<Arc<AppState>>,
    Extension(section): Extension<Section>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let store = state.posts(section);
    let (_, draft, _) = read_post_form(multipart).await?.into_draft();

    let slug = store.create(draft).await?;

    Ok(Json(json!({
        "success": true,
        "redirect": store.flavor().page_route,
        "slug": slug,
    })))
}

pub async fn edit_post(
    State(state): State<Arc<AppState>>,
    Extension(section): Extension<Section>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let store = state.posts(section);
    let (slug, draft, deleted_images) = read_post_form(multipart).await?.into_draft();
    if slug.trim().is_empty() {
        return Err(AppError::BadRequest("All fields are required.".to_string()));
    }

    let new_slug = store.edit(&slug, draft, &deleted_images).await?;

    Ok(Json(json!({
        "success": true,
        "redirect": format!("{}/{}", store.flavor().page_route, new_slug),
        "slug": new_slug,
    })))
}

#[derive(Deserialize)]
pub struct SlugRequest {
    #[serde(default)]
    pub slug: String,
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Extension(section): Extension<Section>,
    payload: Result<Json<SlugRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    if request.slug.trim().is_empty() {
        return Err(AppError::BadRequest("Slug is required.".to_string()));
    }

    let store = state.posts(section);
    store.delete(&request.slug).await?;
    Ok(success(store.flavor().page_route))
}

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Extension(section): Extension<Section>,
    Path((slug, file)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let path = state.posts(section).image_path(&slug, &file).await?;
    let bytes = tokio::fs::read(&path).await.map_err(StoreError::from)?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok(response)
}

// Skills

#[derive(Deserialize)]
pub struct TitleQuery {
    #[serde(default)]
    pub title: String,
}

#[derive(Deserialize)]
pub struct SkillRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEditRequest {
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    pub new_title: String,
    #[serde(default)]
    pub content: String,
}

fn require_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required.".to_string()));
    }
    Ok(())
}

pub async fn list_skills(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.skills.list().await?))
}

pub async fn get_skill(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TitleQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_title(&query.title)?;
    let skill = state
        .skills
        .get(&query.title)
        .await?
        .ok_or_else(|| StoreError::not_found("Skill not found."))?;
    Ok(Json(skill))
}

pub async fn download_skill(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TitleQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_title(&query.title)?;
    let bytes = state
        .skills
        .read(&query.title)
        .await?
        .ok_or_else(|| StoreError::not_found("File not found."))?;

    let file_name = format!("{}.md", query.title);
    let encoded: String = url::form_urlencoded::byte_serialize(file_name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/markdown"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", encoded)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

pub async fn publish_skill(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SkillRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    state.skills.create(&request.title, &request.content).await?;
    Ok(success("/skills"))
}

pub async fn edit_skill(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SkillEditRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    state
        .skills
        .edit(&request.original_title, &request.new_title, &request.content)
        .await?;
    Ok(success("/skills"))
}

pub async fn delete_skill(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TitleQuery>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    require_title(&request.title)?;
    state.skills.delete(&request.title).await?;
    Ok(success("/skills"))
}

// News

#[derive(Deserialize)]
pub struct FeedRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Deserialize)]
pub struct ArticlesQuery {
    pub url: Option<String>,
}

pub async fn list_feeds(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.feeds.list().await?))
}

pub async fn add_feed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    state.feeds.add(&request.url).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn remove_feed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    if request.url.trim().is_empty() {
        return Err(AppError::BadRequest("URL is required".to_string()));
    }
    state.feeds.remove(&request.url).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticlesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let urls = match query.url.filter(|u| !u.trim().is_empty()) {
        Some(url) => vec![url],
        None => state.feeds.list().await?,
    };
    Ok(Json(state.fetcher.fetch_articles(&urls).await))
}

pub async fn track_click(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Click>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(click) = payload?;
    state.tracker.track(click).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn top_issues(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let top = state.tracker.top_issues(state.top_issues_limit).await?;
    Ok(Json(top))
}
