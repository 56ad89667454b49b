//! Error paths for both the stack layer and its HTTP-shaping error type.
//!
//! Tests cover:
//! - Rejected push shapes (no action, wrong patch type)
//! - Preview of an unknown revision
//! - `ApiError`/`ServerError` status code mapping

use axum::response::IntoResponse;
use revision_core::{CoreError, DocId, RevisionStack};
use revision_server::errors::{ApiError, ServerError};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

async fn connect() -> Option<sqlx::PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .ok()
}

#[tokio::test]
async fn push_without_patch_or_master_id_is_rejected() {
    let Some(pool) = connect().await else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };
    let stack = RevisionStack::new(pool, "error_scenarios_widgets");
    stack.ensure_tables().await.unwrap();

    let err = stack.push(None, None, None, json!({})).await.unwrap_err();
    assert!(matches!(err, CoreError::RevisionActionNotValid));
}

#[tokio::test]
async fn push_with_non_object_patch_is_rejected() {
    let Some(pool) = connect().await else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };
    let stack = RevisionStack::new(pool, "error_scenarios_widgets");
    stack.ensure_tables().await.unwrap();

    let master_id = DocId::new();
    let err = stack
        .push(Some(master_id), Some(json!("not an object")), None, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::RevisionActionNotValid));
}

#[tokio::test]
async fn preview_of_an_unknown_revision_id_is_not_found() {
    let Some(pool) = connect().await else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };
    let stack = RevisionStack::new(pool, "error_scenarios_widgets");
    stack.ensure_tables().await.unwrap();

    let err = stack.preview(&DocId::new()).await.unwrap_err();
    assert!(matches!(err, CoreError::RevisionNotFound(_)));
}

#[test]
fn bad_request_maps_to_400() {
    let response = ServerError::from(ApiError::bad_request("ids must not be empty")).into_response();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

#[test]
fn not_found_maps_to_404() {
    let response = ServerError::from(ApiError::not_found("missing")).into_response();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}
