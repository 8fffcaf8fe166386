use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use envdiff::differ::{DiffEntry, ImageChanges};
use envdiff::{ClusterSnapshot, DifferError, DifferStatus, ManifestDiff};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

pub(crate) enum ApiError {
    NoSnapshot,
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NoSnapshot => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no snapshot has been published yet".to_string(),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<DifferError> for ApiError {
    fn from(err: DifferError) -> Self {
        match err {
            DifferError::NoSnapshot => ApiError::NoSnapshot,
            DifferError::UnknownEnvironment(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn current(state: &AppState) -> Result<Arc<ClusterSnapshot>, ApiError> {
    state.reader.current().ok_or(ApiError::NoSnapshot)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnapshotHeader {
    generation: u64,
    completed_at: DateTime<Utc>,
    config_revision: String,
    source: String,
    target: String,
}

impl SnapshotHeader {
    fn of(snapshot: &ClusterSnapshot) -> Self {
        Self {
            generation: snapshot.generation,
            completed_at: snapshot.completed_at,
            config_revision: snapshot.config_revision.to_string(),
            source: snapshot.source.name.clone(),
            target: snapshot.target.name.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiffResponse {
    #[serde(flatten)]
    header: SnapshotHeader,
    diff: ManifestDiff,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RevisionsResponse {
    #[serde(flatten)]
    header: SnapshotHeader,
    entries: Vec<DiffEntry>,
}

#[derive(Deserialize)]
pub(crate) struct ChangesQuery {
    since: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangesResponse {
    environment: String,
    since: DateTime<Utc>,
    images: Vec<ImageChanges>,
}

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

pub(crate) async fn status(State(state): State<AppState>) -> Json<DifferStatus> {
    Json(state.reader.status())
}

pub(crate) async fn diff(State(state): State<AppState>) -> Result<Json<DiffResponse>, ApiError> {
    let snapshot = current(&state)?;
    Ok(Json(DiffResponse {
        header: SnapshotHeader::of(&snapshot),
        diff: snapshot.diff.clone(),
    }))
}

pub(crate) async fn revisions(
    State(state): State<AppState>,
) -> Result<Json<RevisionsResponse>, ApiError> {
    let snapshot = current(&state)?;
    Ok(Json(RevisionsResponse {
        header: SnapshotHeader::of(&snapshot),
        entries: snapshot.diff_with_revisions(),
    }))
}

pub(crate) async fn changes(
    State(state): State<AppState>,
    Path(environment): Path<String>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangesResponse>, ApiError> {
    let since = DateTime::parse_from_rfc3339(&query.since)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("invalid 'since' date '{}': {}", query.since, e)))?;

    let differ = Arc::clone(state.differ());
    let env = environment.clone();
    // git log runs as a blocking child process
    let images = tokio::task::spawn_blocking(move || differ.changes_since(&env, since))
        .await
        .map_err(|e| {
            warn!(error = %e, "changes_since task failed");
            ApiError::Internal(e.to_string())
        })??;

    Ok(Json(ChangesResponse {
        environment,
        since,
        images,
    }))
}

pub(crate) async fn sync(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state.scheduler.trigger() {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::Unavailable(
            "the reconciliation loop is not running".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::{gen_router, AppState};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use envdiff::differ::DiffScheduler;
    use envdiff::{ClusterDiffer, DifferSettings, GitStore};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(GitStore::system(dir.path()));
        let settings = DifferSettings::new(dir.path(), "file:///srv/git/config");
        let differ = Arc::new(ClusterDiffer::new(settings, store).unwrap());
        let scheduler = Arc::new(DiffScheduler::new(differ));
        let router = gen_router().with_state(AppState::new(scheduler));
        (dir, router)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_healthz() {
        let (_dir, router) = app();
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_before_first_cycle() {
        let (_dir, router) = app();
        let (status, json) = get(router, "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "initializing");
        assert_eq!(json["generation"], 0);
    }

    #[tokio::test]
    async fn test_diff_without_snapshot_is_unavailable() {
        let (_dir, router) = app();

        let (status, json) = get(router.clone(), "/api/diff").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"].as_str().unwrap().contains("no snapshot"));

        let (status, _) = get(router, "/api/revisions").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_changes_rejects_bad_date() {
        let (_dir, router) = app();
        let (status, json) = get(router, "/api/changes/dev?since=yesterday").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("yesterday"));
    }

    #[tokio::test]
    async fn test_changes_without_snapshot_is_unavailable() {
        let (_dir, router) = app();
        let (status, _) = get(router, "/api/changes/dev?since=2026-01-01T00:00:00Z").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_sync_without_running_loop() {
        let (_dir, router) = app();
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sync")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
