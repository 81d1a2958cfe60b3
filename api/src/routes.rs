use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use mosaic_refresher::scheduler::SchedulerState;
use mosaic_refresher::snapshot::SnapshotReader;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::page;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub snapshots: SnapshotReader,
    pub scheduler: watch::Receiver<SchedulerState>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    scheduler: &'static str,
    cycle: u64,
    channels: usize,
    captured: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/snapshot", get(snapshot))
        .route("/api/thumbnails/:index", get(thumbnail))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /: the thumbnail wall
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let snapshot = state.snapshots.current();
    Html(page::render(&snapshot))
}

/// GET /api/snapshot: channel names and availability of the current snapshot
async fn snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.snapshots.current().summary())
}

/// GET /api/thumbnails/:index: raw PNG of one channel
async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> impl IntoResponse {
    let snapshot = state.snapshots.current();
    match snapshot.results.get(index).and_then(|r| r.image_data.clone()) {
        Some(data) => ([(header::CONTENT_TYPE, "image/png")], data).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshots.current();
    let scheduler = *state.scheduler.borrow();
    Json(Health {
        status: if scheduler == SchedulerState::Stopped {
            "stopping"
        } else {
            "ok"
        },
        scheduler: scheduler.as_str(),
        cycle: snapshot.cycle,
        channels: snapshot.len(),
        captured: snapshot.captured_count(),
    })
}
