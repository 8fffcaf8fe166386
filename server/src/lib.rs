//! HTTP API over a running [`envdiff::ClusterDiffer`].

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use envdiff::differ::DiffScheduler;
use envdiff::{ClusterDiffer, SnapshotReader};

pub mod cli;
pub mod logging;
mod routes;

#[derive(Clone)]
pub struct AppState {
    scheduler: Arc<DiffScheduler>,
    reader: SnapshotReader,
}

impl AppState {
    pub fn new(scheduler: Arc<DiffScheduler>) -> Self {
        let reader = scheduler.differ().reader();
        Self { scheduler, reader }
    }

    fn differ(&self) -> &Arc<ClusterDiffer> {
        self.scheduler.differ()
    }
}

pub fn gen_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/api/status", get(routes::status))
        .route("/api/diff", get(routes::diff))
        .route("/api/revisions", get(routes::revisions))
        .route("/api/changes/:environment", get(routes::changes))
        .route("/api/sync", post(routes::sync))
}
