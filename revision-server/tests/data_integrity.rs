//! Data integrity tests for the claim/apply path.
//!
//! Tests cover:
//! - `claim_due`'s single bulk claim, not a per-row race
//! - A failed apply still lands the revision in a processed, inspectable state

use revision_core::{ApplyOutcome, DocId};
use revision_server::database::ServerDatabase;
use serde_json::json;

async fn setup() -> Option<ServerDatabase> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    ServerDatabase::new(&url, 3).await.ok()
}

#[tokio::test]
async fn claim_due_atomically_claims_every_due_revision_in_one_pass() {
    let Some(db) = setup().await else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };
    let stack = db.stack("data_integrity_claim").await.unwrap();

    let mut masters = Vec::new();
    for i in 0..5 {
        let pushed = stack
            .push(None, Some(json!({"seq": i})), Some(0), json!({}))
            .await
            .unwrap();
        masters.push(pushed.master_id);
    }

    let claimed = stack.claim_due(i64::MAX, 50).await.unwrap();
    assert_eq!(claimed.len(), 5);
    for master_id in &masters {
        assert!(claimed.contains(master_id));
    }

    // Everything is now `in_process`, so a second claim sees nothing left.
    let claimed_again = stack.claim_due(i64::MAX, 50).await.unwrap();
    assert!(claimed_again.is_empty());
}

#[tokio::test]
async fn apply_failure_still_marks_the_revision_processed() {
    let Some(db) = setup().await else {
        println!("Skipping test: TEST_DATABASE_URL not set");
        return;
    };
    let stack = db.stack("data_integrity_structural").await.unwrap();

    // An update scheduled against a master that was never inserted: the
    // apply itself fails, but the revision must still end up processed so
    // the publisher does not retry it forever.
    let master_id = DocId::new();
    stack
        .push(Some(master_id), Some(json!({"name": "ghost"})), Some(0), json!({}))
        .await
        .unwrap();

    let outcome = stack.pop_outcome(&master_id).await.unwrap().unwrap();
    assert!(matches!(outcome, ApplyOutcome::AppliedWithWarning(_, _)));

    let history = stack.list(&master_id, None, true).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].processed);
    assert!(history[0].meta.get("apply_warning").is_some());
}
