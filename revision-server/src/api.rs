use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use revision_core::{CoreError, DocId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{ApiError, ServerError};
use crate::AppState;

/// Parsed `Caesium-TOA` header: the time a scheduled mutation should take
/// effect, seconds since epoch. Absent means "apply immediately" to the
/// caller, but the core itself always wants an explicit `toa`.
pub mod headers {
    use axum::http::HeaderMap;

    pub struct Toa(pub Option<i64>);

    impl Toa {
        pub fn from_headers(headers: &HeaderMap) -> Self {
            let toa = headers
                .get("Caesium-TOA")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            Toa(toa)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkScheduleRequest {
    pub ids: Vec<DocId>,
    pub patch: Value,
}

#[derive(Debug, Serialize)]
pub struct BulkScheduleResponse {
    pub bulk_id: String,
    pub scheduled: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevisionListQuery {
    #[serde(default)]
    pub add_current: bool,
    #[serde(default)]
    pub show_history: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/collections/:collection/documents/:master_id/revisions",
            get(list_revisions).post(push_revision),
        )
        .route(
            "/collections/:collection/documents/:master_id/revisions/peek",
            get(peek_revision),
        )
        .route(
            "/collections/:collection/revisions/:revision_id/preview",
            get(preview_revision),
        )
        .route(
            "/collections/:collection/revisions/bulk",
            post(bulk_schedule),
        )
        .with_state(state)
}

async fn list_revisions(
    State(state): State<Arc<AppState>>,
    Path((collection, master_id)): Path<(String, String)>,
    Query(query): Query<RevisionListQuery>,
) -> Result<Json<Vec<revision_core::RevisionRecord>>, ServerError> {
    let master_id = DocId::from_hex(&master_id)?;
    let stack = state.db.stack(&collection).await?;

    // A document created before this stack existed has no revision history
    // at all; give it a synthetic one the first time anyone lists it rather
    // than relying solely on the fire-and-forget attempt inside `push`.
    match stack
        .ensure_migrated(
            &master_id,
            Utc::now().timestamp(),
            state.settings.scheduler.lazy_migrated_published_by_default,
        )
        .await
    {
        Ok(()) | Err(CoreError::RevisionNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let revisions = stack.list(&master_id, None, query.show_history).await?;
    Ok(Json(revisions))
}

async fn peek_revision(
    State(state): State<Arc<AppState>>,
    Path((collection, master_id)): Path<(String, String)>,
) -> Result<Json<Option<revision_core::RevisionRecord>>, ServerError> {
    let master_id = DocId::from_hex(&master_id)?;
    let stack = state.db.stack(&collection).await?;
    let revision = stack.peek(&master_id).await?;
    Ok(Json(revision))
}

async fn preview_revision(
    State(state): State<Arc<AppState>>,
    Path((collection, revision_id)): Path<(String, String)>,
) -> Result<Json<revision_core::RevisionRecord>, ServerError> {
    let revision_id = DocId::from_hex(&revision_id)?;
    let stack = state.db.stack(&collection).await?;
    let preview = stack.preview(&revision_id).await?;
    Ok(Json(preview))
}

#[derive(Debug, Deserialize)]
pub struct PushRevisionRequest {
    /// `null` schedules a delete; an object with no pre-existing
    /// `master_id` in the path schedules an insert against a fresh id.
    pub patch: Option<Value>,
    #[serde(default)]
    pub meta: Value,
}

async fn push_revision(
    State(state): State<Arc<AppState>>,
    Path((collection, master_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<PushRevisionRequest>,
) -> Result<Json<String>, ServerError> {
    let master_id = DocId::from_hex(&master_id)?;
    let toa = headers::Toa::from_headers(&headers).0;
    let stack = state.db.stack(&collection).await?;
    let revision = stack
        .push(Some(master_id), req.patch, toa, req.meta)
        .await?;
    if let Some(sink) = &state.activity {
        sink.send(crate::activity::ActivityEvent::Pushed {
            collection: collection.clone(),
            master_id: master_id.to_hex(),
        })
        .await;
    }
    Ok(Json(revision.id.to_hex()))
}

async fn bulk_schedule(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BulkScheduleRequest>,
) -> Result<Json<BulkScheduleResponse>, ServerError> {
    if req.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty").into());
    }
    let toa = headers::Toa::from_headers(&headers).0;
    let stack = state.db.stack(&collection).await?;
    let bulk_id = Uuid::new_v4().simple().to_string();

    let mut scheduled = Vec::with_capacity(req.ids.len());
    for master_id in req.ids {
        let mut meta = serde_json::Map::new();
        meta.insert("bulk_id".to_string(), Value::String(bulk_id.clone()));
        let revision = stack
            .push(Some(master_id), Some(req.patch.clone()), toa, Value::Object(meta))
            .await?;
        scheduled.push(revision.id.to_hex());
    }

    Ok(Json(BulkScheduleResponse { bulk_id, scheduled }))
}
