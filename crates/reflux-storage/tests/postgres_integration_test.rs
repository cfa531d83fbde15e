// Postgres integration tests for the storage layer
// Requires a database: DATABASE_URL=postgres://localhost/reflux_test
// Run with: cargo test -p reflux-storage --test postgres_integration_test -- --ignored

use chrono::{Duration, Utc};
use reflux_storage::{CreateFlow, CreateRun, Database};
use serde_json::json;
use uuid::Uuid;

async fn test_db() -> Database {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a test database");
    let db = Database::from_url(&url).await.expect("connect");
    db.migrate().await.expect("migrate");
    db
}

async fn seed_flow(db: &Database) -> Uuid {
    let flow = db
        .create_flow(CreateFlow {
            name: format!("it-flow-{}", Uuid::now_v7()),
            version: None,
            description: None,
            spec: json!({ "nodes": [], "edges": [] }),
            tags: vec!["integration".to_string()],
            is_active: true,
        })
        .await
        .expect("create flow");
    flow.id
}

#[tokio::test]
#[ignore]
async fn terminal_transitions_are_idempotent() {
    let db = test_db().await;
    let flow_id = seed_flow(&db).await;

    let run = db
        .create_run(CreateRun {
            flow_id,
            flow_version: "1.0.0".to_string(),
            inputs: json!({}),
        })
        .await
        .expect("create run");

    assert!(db.mark_run_running(run.id).await.unwrap());

    let outputs = json!({ "a": { "output": 1 } });
    assert!(db.mark_run_completed(run.id, &outputs).await.unwrap());
    let first = db.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(first.status, "completed");
    let first_duration = first.duration_ms;
    assert!(first_duration.is_some());

    // Second completion is a no-op: no state change, no re-stamped duration
    assert!(!db.mark_run_completed(run.id, &outputs).await.unwrap());
    let second = db.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(second.duration_ms, first_duration);
    assert_eq!(second.completed_at, first.completed_at);

    // Failure after completion is also a no-op
    assert!(!db.mark_run_failed(run.id, "late error").await.unwrap());
    let third = db.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(third.status, "completed");
    assert!(third.error.is_none());
}

#[tokio::test]
#[ignore]
async fn versioned_update_snapshots_the_prior_state() {
    let db = test_db().await;
    let flow_id = seed_flow(&db).await;

    let updated = db
        .update_flow(
            flow_id,
            reflux_storage::UpdateFlow {
                spec: Some(json!({ "nodes": [{ "id": "a", "type": "nodes.test" }], "edges": [] })),
                changelog: Some("add node a".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("flow exists");
    assert_eq!(updated.version, "1.0.1");

    let versions = db.list_flow_versions(flow_id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, "1.0.0");
    assert_eq!(versions[0].spec, json!({ "nodes": [], "edges": [] }));
}

#[tokio::test]
#[ignore]
async fn rollback_writes_two_version_rows() {
    let db = test_db().await;
    let flow_id = seed_flow(&db).await;

    db.update_flow(
        flow_id,
        reflux_storage::UpdateFlow {
            spec: Some(json!({ "nodes": [{ "id": "a", "type": "nodes.test" }], "edges": [] })),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    let versions = db.list_flow_versions(flow_id).await.unwrap();
    let original = versions.last().unwrap();

    let before = versions.len();
    let restored = db
        .rollback_flow(flow_id, original.id, Some("tester"))
        .await
        .unwrap()
        .expect("rollback target exists");
    assert_eq!(restored.spec, original.spec);

    let after = db.list_flow_versions(flow_id).await.unwrap();
    assert_eq!(after.len(), before + 2);
}

#[tokio::test]
#[ignore]
async fn expired_runs_delete_in_batches() {
    let db = test_db().await;
    let flow_id = seed_flow(&db).await;

    // Seed 25 old completed runs and 5 fresh ones
    for _ in 0..25 {
        let run = db
            .create_run(CreateRun {
                flow_id,
                flow_version: "1.0.0".to_string(),
                inputs: json!({}),
            })
            .await
            .unwrap();
        db.mark_run_completed(run.id, &json!({})).await.unwrap();
        sqlx::query("UPDATE runs SET completed_at = $2 WHERE id = $1")
            .bind(run.id)
            .bind(Utc::now() - Duration::days(40))
            .execute(db.pool())
            .await
            .unwrap();
    }
    for _ in 0..5 {
        let run = db
            .create_run(CreateRun {
                flow_id,
                flow_version: "1.0.0".to_string(),
                inputs: json!({}),
            })
            .await
            .unwrap();
        db.mark_run_completed(run.id, &json!({})).await.unwrap();
    }

    let cutoff = Utc::now() - Duration::days(30);
    assert_eq!(
        db.count_expired_runs("completed", cutoff).await.unwrap(),
        25
    );

    let mut total = 0u64;
    let mut batches = 0;
    loop {
        let ids = db
            .select_expired_run_ids("completed", cutoff, 10)
            .await
            .unwrap();
        if ids.is_empty() {
            break;
        }
        assert!(ids.len() <= 10);
        total += db.delete_runs_by_ids(&ids).await.unwrap();
        batches += 1;
    }

    assert_eq!(total, 25);
    assert_eq!(batches, 3);
    assert_eq!(db.count_expired_runs("completed", cutoff).await.unwrap(), 0);
    // The fresh runs survive
    let remaining = db
        .list_runs(Some("completed"), Some(flow_id), 100, 0)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 5);
}

#[tokio::test]
#[ignore]
async fn cleanup_lock_excludes_a_second_holder() {
    let db = test_db().await;

    let lock = db
        .try_acquire_cleanup_lock()
        .await
        .unwrap()
        .expect("first acquire succeeds");
    assert!(db.try_acquire_cleanup_lock().await.unwrap().is_none());

    lock.release().await.unwrap();
    let again = db.try_acquire_cleanup_lock().await.unwrap();
    assert!(again.is_some());
    again.unwrap().release().await.unwrap();
}
