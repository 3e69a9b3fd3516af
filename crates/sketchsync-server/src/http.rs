//! Read-only HTTP status endpoints.
//!
//! Edits only travel over the line protocol; these routes expose health,
//! counters and a JSON copy of the scene for dashboards and debugging.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use sketchsync_core::{Shape, ShapeId};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// One scene entry in the `/scene` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneEntry {
    pub id: ShapeId,
    pub shape: Shape,
}

/// Body of `/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub connections: usize,
    pub shapes: usize,
    pub next_id: ShapeId,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/scene", get(scene))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status router until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn index() -> &'static str {
    "SketchSync Relay Server - connect with the line protocol on the relay port"
}

async fn health() -> &'static str {
    "ok"
}

async fn scene(State(state): State<Arc<AppState>>) -> Json<Vec<SceneEntry>> {
    let entries = state
        .scene
        .snapshot()
        .into_iter()
        .map(|(id, shape)| SceneEntry {
            id,
            shape: Shape::clone(&shape),
        })
        .collect();
    Json(entries)
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(Stats {
        connections: state.registry.len(),
        shapes: state.scene.len(),
        next_id: state.scene.next_id(),
    })
}
