//! Application events pushed to change subscribers

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use newsfeed_core::ChangeKind;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LanguageChange {
    pub language: String,
}

/// Create event routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/events/language", post(language_changed))
}

/// POST /api/events/language - Tell subscribers the UI language changed
async fn language_changed(
    State(state): State<AppState>,
    Json(request): Json<LanguageChange>,
) -> impl IntoResponse {
    let language = request.language.trim();
    if language.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "language must not be empty" })),
        );
    }

    let delivered = state
        .notifier
        .publish_synthetic(ChangeKind::LanguageChanged, Some(language.to_string()));
    (StatusCode::OK, Json(json!({ "delivered": delivered })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use newsfeed_core::ChangeOrigin;

    #[tokio::test]
    async fn test_language_change_reaches_subscribers() {
        let state = test_support::state();
        let (_registration, mut rx) = state.notifier.subscribe_channel();

        let response = language_changed(
            State(state.clone()),
            Json(LanguageChange {
                language: " de ".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::LanguageChanged);
        assert_eq!(event.link.as_deref(), Some("de"));
        assert_eq!(event.origin, ChangeOrigin::Synthetic);
    }

    #[tokio::test]
    async fn test_blank_language_rejected() {
        let response = language_changed(
            State(test_support::state()),
            Json(LanguageChange {
                language: "  ".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
