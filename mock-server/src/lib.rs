use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{Mutex, RwLock},
};
use uuid::Uuid;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const DEFAULT_CSRF_TOKEN: &str = "test-csrf-token";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub published: bool,
}

#[derive(Deserialize)]
pub struct CreateBlog {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Deserialize)]
pub struct UpdateBlog {
    pub title: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
}

#[derive(Clone)]
pub struct AppState {
    blogs: Arc<RwLock<HashMap<Uuid, Blog>>>,
    /// Requests served so far per flaky key.
    flaky: Arc<Mutex<HashMap<String, u32>>>,
    csrf_token: Arc<str>,
}

impl AppState {
    pub fn new(csrf_token: &str) -> Self {
        Self {
            blogs: Arc::default(),
            flaky: Arc::default(),
            csrf_token: Arc::from(csrf_token),
        }
    }
}

pub fn app() -> Router {
    app_with_token(DEFAULT_CSRF_TOKEN)
}

pub fn app_with_token(csrf_token: &str) -> Router {
    Router::new()
        .route("/api/blogs", get(list_blogs).post(create_blog))
        .route("/api/blogs/{id}", get(get_blog).put(update_blog).delete(delete_blog))
        .route("/api/protected", get(protected))
        .route("/api/status/{code}", get(status))
        .route("/api/flaky/{key}/{failures}", get(flaky))
        .route("/api/slow/{ms}", get(slow))
        .with_state(AppState::new(csrf_token))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn check_csrf(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    match headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) if token == &*state.csrf_token => Ok(()),
        _ => Err(StatusCode::FORBIDDEN),
    }
}

async fn list_blogs(State(state): State<AppState>) -> Json<Vec<Blog>> {
    let blogs = state.blogs.read().await;
    let mut all: Vec<Blog> = blogs.values().cloned().collect();
    all.sort_by(|a, b| a.slug.cmp(&b.slug));
    Json(all)
}

async fn create_blog(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateBlog>,
) -> Result<(StatusCode, Json<Blog>), StatusCode> {
    check_csrf(&state, &headers)?;
    let mut blogs = state.blogs.write().await;
    if blogs.values().any(|b| b.slug == input.slug) {
        return Err(StatusCode::CONFLICT);
    }
    let blog = Blog {
        id: Uuid::new_v4(),
        title: input.title,
        slug: input.slug,
        content: input.content,
        published: input.published,
    };
    blogs.insert(blog.id, blog.clone());
    Ok((StatusCode::CREATED, Json(blog)))
}

async fn get_blog(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Blog>, StatusCode> {
    let blogs = state.blogs.read().await;
    blogs.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_blog(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdateBlog>,
) -> Result<Json<Blog>, StatusCode> {
    check_csrf(&state, &headers)?;
    let mut blogs = state.blogs.write().await;
    let blog = blogs.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(title) = input.title {
        blog.title = title;
    }
    if let Some(content) = input.content {
        blog.content = content;
    }
    if let Some(published) = input.published {
        blog.published = published;
    }
    Ok(Json(blog.clone()))
}

async fn delete_blog(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    check_csrf(&state, &headers)?;
    let mut blogs = state.blogs.write().await;
    blogs.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

/// 401 unless a bearer token is present.
async fn protected(headers: HeaderMap) -> Result<&'static str, StatusCode> {
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if authorized {
        Ok("welcome")
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Responds with the requested status code.
async fn status(Path(code): Path<u16>) -> Result<StatusCode, StatusCode> {
    StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)
}

/// Returns 503 for the first `failures` requests per key, then 200 with the
/// attempt number in the body.
async fn flaky(
    State(state): State<AppState>,
    Path((key, failures)): Path<(String, u32)>,
) -> (StatusCode, String) {
    let mut served = state.flaky.lock().await;
    let count = served.entry(key).or_insert(0);
    *count += 1;
    if *count <= failures {
        (StatusCode::SERVICE_UNAVAILABLE, format!("attempt {count}"))
    } else {
        (StatusCode::OK, format!("attempt {count}"))
    }
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_serializes_to_json() {
        let blog = Blog {
            id: Uuid::nil(),
            title: "Income tax slabs explained".to_string(),
            slug: "income-tax-slabs".to_string(),
            content: String::new(),
            published: false,
        };
        let json = serde_json::to_value(&blog).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["slug"], "income-tax-slabs");
        assert_eq!(json["published"], false);
    }

    #[test]
    fn create_blog_defaults_optional_fields() {
        let input: CreateBlog =
            serde_json::from_str(r#"{"title":"Audit checklist","slug":"audit-checklist"}"#).unwrap();
        assert_eq!(input.title, "Audit checklist");
        assert!(input.content.is_empty());
        assert!(!input.published);
    }

    #[test]
    fn create_blog_rejects_missing_slug() {
        let result: Result<CreateBlog, _> = serde_json::from_str(r#"{"title":"No slug"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_blog_all_fields_optional() {
        let input: UpdateBlog = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.title.is_none());
        assert!(input.content.is_none());
        assert!(input.published.is_none());
    }

    #[test]
    fn csrf_check_requires_matching_token() {
        let state = AppState::new("secret");
        let mut headers = HeaderMap::new();
        assert_eq!(check_csrf(&state, &headers), Err(StatusCode::FORBIDDEN));

        headers.insert(CSRF_HEADER, "wrong".parse().unwrap());
        assert_eq!(check_csrf(&state, &headers), Err(StatusCode::FORBIDDEN));

        headers.insert(CSRF_HEADER, "secret".parse().unwrap());
        assert_eq!(check_csrf(&state, &headers), Ok(()));
    }
}
