//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use newsfeed_services::WatchMode;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    store: &'static str,
    notifier_mode: String,
    change_subscribers: usize,
    entry_listeners: usize,
    summarization_enabled: bool,
    summarization_queue: usize,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mode = state.notifier.mode();
    let healthy = mode != WatchMode::Stopped;

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        store: state.entries.store().backend(),
        notifier_mode: format!("{:?}", mode).to_lowercase(),
        change_subscribers: state.notifier.subscriber_count(),
        entry_listeners: state.broadcaster.listener_count(),
        summarization_enabled: state.summarizer.is_some(),
        summarization_queue: state.summarizer.as_ref().map_or(0, |q| q.len()),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;

    #[tokio::test]
    async fn test_health_reports_services() {
        let state = test_support::state();
        let (code, Json(body)) = health_check(State(state.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.notifier_mode, "starting");
        assert_eq!(body.store, "memory");
        assert!(!body.summarization_enabled);

        state.notifier.shutdown();
        let (code, Json(body)) = health_check(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
    }
}
