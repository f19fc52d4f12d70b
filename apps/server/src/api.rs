//! HTTP control API for the monitor.
//!
//! The store is the source of truth for the watchlist; watchlist edits are
//! saved first and then applied to the running engine. Edits hold
//! `AppState::edits` from load to engine update, so concurrent requests
//! cannot overwrite each other's saves.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use stockwatch_core::{ConfigError, StoreError, Ticker, WatchEntry, WatchlistStore};
use stockwatch_engine::{EngineError, MonitorHandle, MonitorStatus, TickReport};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: MonitorHandle,
    pub store: Arc<dyn WatchlistStore>,
    pub user: String,
    /// Serializes watchlist read-modify-write cycles.
    edits: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(engine: MonitorHandle, store: Arc<dyn WatchlistStore>, user: String) -> Self {
        Self {
            engine,
            store,
            user,
            edits: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Engine(EngineError::Config(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine(EngineError::NotRunning) => StatusCode::CONFLICT,
            ApiError::Engine(EngineError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetBody {
    pub target_price: Decimal,
}

/// Create the control API router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/monitor/start", post(start_handler))
        .route("/monitor/stop", post(stop_handler))
        .route("/monitor/tick", post(tick_handler))
        .route(
            "/watchlist/:ticker",
            put(put_entry_handler).delete(delete_entry_handler),
        )
        .layer(cors)
        .with_state(state)
}

/// Bind `port` and serve the API in the background.
pub async fn start_http_server(state: AppState, port: u16) -> std::io::Result<JoinHandle<()>> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://0.0.0.0:{}", port);

    let app = create_router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    }))
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(state): State<AppState>) -> Json<MonitorStatus> {
    Json(state.engine.status())
}

/// Start from the stored watchlist, or reload it into a running session.
async fn start_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let _edits = state.edits.lock().await;
    let entries = state.store.load(&state.user).await?;
    let count = entries.len();

    let started = state.engine.start(entries.clone()).await?;
    if !started {
        state.engine.reload(entries).await?;
    }

    Ok(Json(json!({ "started": started, "entries": count })))
}

async fn stop_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stopped = state.engine.stop().await?;
    Ok(Json(json!({ "stopped": stopped })))
}

async fn tick_handler(State(state): State<AppState>) -> Result<Json<TickReport>, ApiError> {
    Ok(Json(state.engine.tick().await?))
}

async fn put_entry_handler(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Json(body): Json<TargetBody>,
) -> Result<Json<Value>, ApiError> {
    let entry = WatchEntry::new(&ticker, body.target_price)?;

    let _edits = state.edits.lock().await;
    let mut entries = state.store.load(&state.user).await?;
    match entries.iter_mut().find(|e| e.ticker == entry.ticker) {
        Some(existing) => existing.target_price = entry.target_price,
        None => entries.push(entry.clone()),
    }
    state.store.save(&state.user, &entries).await?;

    let change = state
        .engine
        .update_entry(entry.ticker.as_str(), entry.target_price)
        .await?;

    Ok(Json(json!({
        "ticker": entry.ticker,
        "target_price": entry.target_price,
        "change": change,
    })))
}

async fn delete_entry_handler(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Response, ApiError> {
    let ticker = Ticker::parse(&ticker)?;

    let _edits = state.edits.lock().await;
    let mut entries = state.store.load(&state.user).await?;
    let before = entries.len();
    entries.retain(|e| e.ticker != ticker);
    let stored = entries.len() != before;
    if stored {
        state.store.save(&state.user, &entries).await?;
    }

    let watched = state.engine.remove_entry(ticker.as_str()).await?;
    if !stored && !watched {
        let body = Json(json!({ "error": format!("{} is not on the watchlist", ticker) }));
        return Ok((StatusCode::NOT_FOUND, body).into_response());
    }

    Ok(Json(json!({ "removed": ticker })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use stockwatch_alerts::{Database, LogSink};
    use stockwatch_core::MemoryWatchlistStore;
    use stockwatch_engine::MonitorConfig;
    use stockwatch_feeds::ScriptedSource;

    fn test_state(source: Arc<ScriptedSource>) -> AppState {
        let (engine, _task) = MonitorHandle::spawn(
            source,
            Arc::new(LogSink),
            MonitorConfig::with_poll_interval(Duration::from_secs(3600)),
        );
        AppState::new(
            engine,
            Arc::new(MemoryWatchlistStore::new()),
            "alice".to_string(),
        )
    }

    fn target(price: Decimal) -> Json<TargetBody> {
        Json(TargetBody {
            target_price: price,
        })
    }

    #[tokio::test]
    async fn test_put_saves_and_updates_engine() {
        let state = test_state(Arc::new(ScriptedSource::new()));

        let Json(body) = put_entry_handler(
            State(state.clone()),
            Path("aapl".to_string()),
            target(dec!(150)),
        )
        .await
        .unwrap();
        assert_eq!(body["ticker"], "AAPL");
        assert_eq!(body["change"], "added");

        let stored = state.store.load("alice").await.unwrap();
        assert_eq!(stored, vec![WatchEntry::new("AAPL", dec!(150)).unwrap()]);
        assert_eq!(state.engine.status().entries.len(), 1);

        let Json(body) = put_entry_handler(
            State(state.clone()),
            Path("AAPL".to_string()),
            target(dec!(160)),
        )
        .await
        .unwrap();
        assert_eq!(body["change"], "retargeted");
        assert_eq!(state.store.load("alice").await.unwrap()[0].target_price, dec!(160));
    }

    #[tokio::test]
    async fn test_put_rejects_negative_target() {
        let state = test_state(Arc::new(ScriptedSource::new()));
        let err = put_entry_handler(State(state.clone()), Path("AAPL".to_string()), target(dec!(-1)))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(state.store.load("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_uses_store() {
        let source = Arc::new(ScriptedSource::new());
        let state = test_state(source.clone());

        let err = start_handler(State(state.clone())).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        state
            .store
            .save("alice", &[WatchEntry::new("MSFT", dec!(400)).unwrap()])
            .await
            .unwrap();
        let Json(body) = start_handler(State(state.clone())).await.unwrap();
        assert_eq!(body["started"], true);
        assert_eq!(body["entries"], 1);
        assert!(state.engine.status().active);

        let Json(body) = start_handler(State(state.clone())).await.unwrap();
        assert_eq!(body["started"], false);

        let Json(body) = stop_handler(State(state.clone())).await.unwrap();
        assert_eq!(body["stopped"], true);
    }

    #[tokio::test]
    async fn test_tick_requires_running_monitor() {
        let state = test_state(Arc::new(ScriptedSource::new()));
        let err = tick_handler(State(state)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let state = test_state(Arc::new(ScriptedSource::new()));
        put_entry_handler(State(state.clone()), Path("AAPL".to_string()), target(dec!(150)))
            .await
            .unwrap();

        let response = delete_entry_handler(State(state.clone()), Path("aapl".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.store.load("alice").await.unwrap().is_empty());
        assert!(state.engine.status().entries.is_empty());

        let response = delete_entry_handler(State(state.clone()), Path("AAPL".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_edits_keep_store_and_engine_in_sync() {
        let path = std::env::temp_dir().join(format!(
            "stockwatch-api-{}-{}.db",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let db = Database::connect(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();

        let (engine, _task) = MonitorHandle::spawn(
            Arc::new(ScriptedSource::new()),
            Arc::new(LogSink),
            MonitorConfig::with_poll_interval(Duration::from_secs(3600)),
        );
        let state = AppState::new(engine, Arc::new(db), "alice".to_string());

        let (aapl, msft, nvda) = tokio::join!(
            put_entry_handler(State(state.clone()), Path("AAPL".to_string()), target(dec!(150))),
            put_entry_handler(State(state.clone()), Path("MSFT".to_string()), target(dec!(400))),
            put_entry_handler(State(state.clone()), Path("NVDA".to_string()), target(dec!(900))),
        );
        aapl.unwrap();
        msft.unwrap();
        nvda.unwrap();

        let mut stored: Vec<String> = state
            .store
            .load("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.ticker.to_string())
            .collect();
        stored.sort();
        let mut watched: Vec<String> = state
            .engine
            .status()
            .entries
            .into_iter()
            .map(|e| e.ticker.to_string())
            .collect();
        watched.sort();

        assert_eq!(stored, vec!["AAPL", "MSFT", "NVDA"]);
        assert_eq!(stored, watched);

        let (removed, retargeted) = tokio::join!(
            delete_entry_handler(State(state.clone()), Path("MSFT".to_string())),
            put_entry_handler(State(state.clone()), Path("AAPL".to_string()), target(dec!(155))),
        );
        removed.unwrap();
        retargeted.unwrap();

        let mut stored = state.store.load("alice").await.unwrap();
        stored.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        assert_eq!(
            stored,
            vec![
                WatchEntry::new("AAPL", dec!(155)).unwrap(),
                WatchEntry::new("NVDA", dec!(900)).unwrap(),
            ]
        );

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
