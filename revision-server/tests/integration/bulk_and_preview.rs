use super::helpers::TestContext;
use serde_json::json;

#[tokio::test]
async fn bulk_scheduling_creates_one_revision_per_id() {
    let ctx = match TestContext::new("bulk").await {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("Skipping test: {}", e);
            return;
        }
    };
    let stack = ctx.db.stack(&ctx.collection).await.unwrap();

    let mut master_ids = Vec::new();
    for _ in 0..3 {
        let pushed = stack
            .push(None, Some(json!({"name": "widget"})), Some(0), json!({}))
            .await
            .unwrap();
        master_ids.push(pushed.master_id);
    }

    let bulk_id = "bulk-test".to_string();
    for master_id in &master_ids {
        let mut meta = serde_json::Map::new();
        meta.insert("bulk_id".to_string(), json!(bulk_id));
        stack
            .push(
                Some(*master_id),
                Some(json!({"published": true})),
                Some(0),
                serde_json::Value::Object(meta),
            )
            .await
            .unwrap();
    }

    for master_id in &master_ids {
        let pending = stack.list(master_id, None, false).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].meta.get("bulk_id").and_then(|v| v.as_str()),
            Some(bulk_id.as_str())
        );
    }
}

#[tokio::test]
async fn preview_replays_pending_updates_without_consuming_them() {
    let ctx = match TestContext::new("preview").await {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("Skipping test: {}", e);
            return;
        }
    };
    let stack = ctx.db.stack(&ctx.collection).await.unwrap();

    let inserted = stack
        .push(None, Some(json!({"name": "widget", "count": 1})), Some(0), json!({}))
        .await
        .unwrap();
    stack.pop(&inserted.master_id).await.unwrap();

    let update = stack
        .push(Some(inserted.master_id), Some(json!({"count": 2})), Some(1), json!({}))
        .await
        .unwrap();

    let previewed = stack.preview(&update.id).await.unwrap();
    let snapshot = previewed.snapshot.expect("preview computes a snapshot");
    assert_eq!(snapshot.get("count").and_then(|v| v.as_i64()), Some(2));

    let still_pending = stack.peek(&inserted.master_id).await.unwrap();
    assert!(
        still_pending.is_some(),
        "preview must not consume the pending revision"
    );
}
