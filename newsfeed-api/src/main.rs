//! Cycling Newsfeed API Server
//!
//! Polls the configured cycling feeds, stores new entries, summarizes long
//! articles and serves listings plus a live WebSocket stream.

mod config;
mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use newsfeed_enrichment::{OpenAIGenerator, YoutubeTranscriptClient};
use newsfeed_feeds::{HttpFeedFetcher, SpamFilter};
use newsfeed_services::{
    Broadcaster, ChangeNotifier, EntryService, FeedPoller, MemoryNewsStore, NewsStore,
    SqliteNewsStore, SummarizationQueue,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppConfig, StoreBackend};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub entries: Arc<EntryService>,
    pub broadcaster: Arc<Broadcaster>,
    pub notifier: Arc<ChangeNotifier>,
    /// Summarization queue (optional - requires OPENAI_API_KEY)
    pub summarizer: Option<Arc<SummarizationQueue>>,
}

/// Build the HTTP router for the given state
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", routes::api_routes())
        .merge(routes::ws_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,newsfeed_api=debug")),
        )
        .init();

    info!("Starting Cycling Newsfeed API");

    let config = AppConfig::from_env()?;
    let feeds = config.feeds()?;
    info!("Loaded {} feeds", feeds.len());

    // Initialize store
    let store: Arc<dyn NewsStore> = match config.store_backend {
        StoreBackend::Sqlite => {
            info!("Initializing SQLite store at: {}", config.database_path.display());
            Arc::new(SqliteNewsStore::new(&config.database_path)?.with_zone(config.reference_zone))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryNewsStore::new().with_zone(config.reference_zone))
        }
    };

    let broadcaster = Arc::new(Broadcaster::new());

    // Initialize summarization (optional - requires OPENAI_API_KEY)
    let summarizer = match &config.openai_api_key {
        Some(api_key) => {
            let generator =
                OpenAIGenerator::with_credentials(api_key, config.openai_api_base.as_deref())
                    .with_model(&config.openai_model);
            info!("Summarization enabled with model {}", generator.model());
            let transcripts = YoutubeTranscriptClient::new()?;
            Some(Arc::new(SummarizationQueue::new(
                store.clone(),
                Arc::new(generator),
                Arc::new(transcripts),
                config.summarization_config(),
            )))
        }
        None => {
            info!("Summarization disabled. Set OPENAI_API_KEY to enable.");
            None
        }
    };

    // Initialize entry service
    let mut entries = EntryService::new(store.clone(), broadcaster.clone());
    if let Some(queue) = &summarizer {
        entries = entries.with_summarizer(queue.clone());
    }
    let entries = Arc::new(entries);

    // Initialize feed poller
    let mut poller = FeedPoller::new(
        feeds,
        Arc::new(HttpFeedFetcher::new()?),
        store.clone(),
        broadcaster.clone(),
        config.poller_config(),
    )
    .with_spam_filter(SpamFilter::new(&config.spam_tokens));
    if let Some(queue) = &summarizer {
        poller = poller.with_summarizer(queue.clone());
    }
    let poller = Arc::new(poller);

    let notifier = Arc::new(ChangeNotifier::new(store.clone(), config.notifier_config()));

    // Start background services
    let poller_handle = poller.start();
    let notifier_handle = notifier.clone().start();
    let summarizer_handle = summarizer.clone().map(|queue| queue.start());

    let state = AppState {
        entries,
        broadcaster,
        notifier: notifier.clone(),
        summarizer,
    };
    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background services
    notifier.shutdown();
    if let Err(e) = notifier_handle.await {
        warn!("Change notifier task ended abnormally: {}", e);
    }
    poller_handle.abort();
    if let Some(handle) = summarizer_handle {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}
