//! API route definitions

mod events;
mod health;
mod news;
pub mod ws;

use axum::Router;
use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(news::routes())
        .merge(events::routes())
        .merge(health::routes())
}

/// Create WebSocket routes (separate from API)
pub fn ws_routes() -> Router<AppState> {
    ws::routes()
}

/// Split a `lang=en,de` query value into language tags
fn parse_languages(lang: Option<&str>) -> Vec<String> {
    lang.map(|value| {
        value
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    })
    .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages() {
        assert!(parse_languages(None).is_empty());
        assert_eq!(parse_languages(Some("en, de,,")), vec!["en", "de"]);
    }
}
