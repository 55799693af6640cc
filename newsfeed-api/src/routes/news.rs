//! News listing and mutation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use newsfeed_core::{NewsEntry, VoteDirection};
use newsfeed_services::EntryError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::parse_languages;
use crate::AppState;

/// Query parameters shared by the listings
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma separated language tags, e.g. `en,de`
    pub lang: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub lang: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub link: String,
}

#[derive(Debug, Deserialize)]
pub struct NewEntryRequest {
    pub link: String,
    pub title: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    newsfeed_core::DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub link: String,
    pub direction: VoteDirection,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub link: String,
}

#[derive(Debug, Serialize)]
struct NewsListResponse {
    count: usize,
    entries: Vec<NewsEntry>,
}

/// Create news routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(latest_news).post(add_entry).delete(delete_entry))
        .route("/news/popular", get(popular_news))
        .route("/news/most-viewed", get(most_viewed_news))
        .route("/news/site/{domain}", get(site_news))
        .route("/news/search", get(search_news))
        .route("/news/vote", post(vote))
        .route("/news/view", post(record_view))
        .route("/news/summarize", post(summarize))
}

fn error_response(err: EntryError) -> Response {
    let status = match &err {
        EntryError::NotFound(_) => StatusCode::NOT_FOUND,
        EntryError::AlreadyExists(_) => StatusCode::CONFLICT,
        EntryError::Invalid(_) => StatusCode::BAD_REQUEST,
        EntryError::Store(e) => {
            error!("Store error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn list_response(result: Result<Vec<NewsEntry>, EntryError>) -> Response {
    match result {
        Ok(entries) => (
            StatusCode::OK,
            Json(NewsListResponse {
                count: entries.len(),
                entries,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/news - Newest entries of the last two days
async fn latest_news(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Response {
    let languages = parse_languages(params.lang.as_deref());
    list_response(state.entries.latest(&languages, params.limit).await)
}

/// GET /api/news/popular - Entries ordered by votes
async fn popular_news(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Response {
    let languages = parse_languages(params.lang.as_deref());
    list_response(state.entries.most_voted(&languages, params.limit).await)
}

/// GET /api/news/most-viewed - Entries ordered by views
async fn most_viewed_news(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Response {
    let languages = parse_languages(params.lang.as_deref());
    list_response(state.entries.most_viewed(&languages, params.limit).await)
}

/// GET /api/news/site/{domain}
async fn site_news(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(params): Query<ListQuery>,
) -> Response {
    let languages = parse_languages(params.lang.as_deref());
    list_response(state.entries.by_site(&domain, &languages, params.limit).await)
}

/// GET /api/news/search?q=... - Entries whose title holds every word
async fn search_news(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let query = match params.q {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Query parameter is required" })),
            )
                .into_response();
        }
    };
    let languages = parse_languages(params.lang.as_deref());
    list_response(state.entries.search(&query, &languages, params.limit).await)
}

/// POST /api/news - Add a link by hand
async fn add_entry(
    State(state): State<AppState>,
    Json(request): Json<NewEntryRequest>,
) -> Response {
    match state
        .entries
        .add_manual(&request.link, &request.title, &request.language)
        .await
    {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/news?link=... - Hide an entry, keeping its link taken
async fn delete_entry(
    State(state): State<AppState>,
    Query(params): Query<LinkQuery>,
) -> Response {
    match state.entries.soft_delete(&params.link).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/news/vote
async fn vote(State(state): State<AppState>, Json(request): Json<VoteRequest>) -> Response {
    match state.entries.vote(&request.link, request.direction).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/news/view
async fn record_view(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Response {
    match state.entries.record_view(&request.link).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/news/summarize - Queue an entry for summarization
async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Response {
    if state.summarizer.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Summarization not configured. Please set OPENAI_API_KEY." })),
        )
            .into_response();
    }

    match state.entries.enqueue(&request.link).await {
        Ok(queued) => {
            info!("Summarize request for {} (queued: {})", request.link, queued);
            (StatusCode::ACCEPTED, Json(json!({ "queued": queued }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn app() -> Router {
        crate::build_router(test_support::state())
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/news",
            Some(json!({
                "link": "https://www.velonews.com/a",
                "title": "Stage 9 report",
                "language": "en"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["link"], "https://www.velonews.com/a");
        assert_eq!(body["language"], "en");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/news",
            Some(json!({ "link": "https://www.velonews.com/a", "title": "Again" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/news",
            Some(json!({ "link": "ftp://velonews.com/a", "title": "Bad link" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, Method::GET, "/api/news?lang=en", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (_, body) = call(&app, Method::GET, "/api/news/site/velonews.com", None).await;
        assert_eq!(body["count"], 1);

        let (_, body) = call(&app, Method::GET, "/api/news/search?q=STAGE", None).await;
        assert_eq!(body["count"], 1);

        let (status, _) = call(&app, Method::GET, "/api/news/search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_vote_view_and_delete() {
        let app = app();
        call(
            &app,
            Method::POST,
            "/api/news",
            Some(json!({ "link": "https://example.com/a", "title": "Race Update" })),
        )
        .await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/news/vote",
            Some(json!({ "link": "https://example.com/a", "direction": "up" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["votes"], 1);

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/news/view",
            Some(json!({ "link": "https://example.com/a" })),
        )
        .await;
        assert_eq!(body["views"], 1);

        let (_, body) = call(&app, Method::GET, "/api/news/popular", None).await;
        assert_eq!(body["count"], 1);

        let (status, _) = call(
            &app,
            Method::DELETE,
            "/api/news?link=https://example.com/a",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&app, Method::GET, "/api/news/most-viewed", None).await;
        assert_eq!(body["count"], 0);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/news/vote",
            Some(json!({ "link": "https://example.com/a", "direction": "down" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summarize_requires_generator() {
        let app = app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/news/summarize",
            Some(json!({ "link": "https://example.com/a" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
