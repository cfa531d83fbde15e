// Integration tests for the Reflux API
// Requires a running server: cargo run -p reflux-api
// Run with: cargo test -p reflux-api --test integration_test -- --ignored

use serde_json::{json, Value};

const API_BASE_URL: &str = "http://localhost:9000";

async fn wait_for_terminal(client: &reqwest::Client, run_id: &str) -> Value {
    for _ in 0..50 {
        let run: Value = client
            .get(format!("{}/api/runs/{}", API_BASE_URL, run_id))
            .send()
            .await
            .expect("get run")
            .json()
            .await
            .expect("parse run");
        let status = run["status"].as_str().unwrap_or_default().to_string();
        if status == "completed" || status == "failed" || status == "cancelled" {
            return run;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("run {run_id} never reached a terminal state");
}

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn full_flow_lifecycle() {
    let client = reqwest::Client::new();

    // Step 1: create a flow that needs no external services
    let create_response = client
        .post(format!("{}/api/flows", API_BASE_URL))
        .json(&json!({
            "name": format!("it-lifecycle-{}", uuid_suffix()),
            "spec": {
                "nodes": [
                    { "id": "double", "type": "nodes.transform.execute",
                      "params": { "code": "outputs.y = n * 2" } },
                    { "id": "check", "type": "nodes.condition.execute",
                      "params": { "condition": "double.y > 4" } }
                ],
                "edges": [ { "from": "double", "to": "check" } ]
            },
            "tags": ["integration"]
        }))
        .send()
        .await
        .expect("create flow");
    assert_eq!(create_response.status(), 201);
    let flow: Value = create_response.json().await.expect("parse flow");
    let flow_id = flow["id"].as_str().expect("flow id").to_string();

    // Step 2: execute it
    let execute_response = client
        .post(format!("{}/api/flows/{}/execute", API_BASE_URL, flow_id))
        .json(&json!({ "inputs": { "n": 3 } }))
        .send()
        .await
        .expect("execute flow");
    assert_eq!(execute_response.status(), 200);
    let run: Value = execute_response.json().await.expect("parse run");
    let run_id = run["id"].as_str().expect("run id").to_string();

    // Step 3: the run completes with both node outputs recorded
    let finished = wait_for_terminal(&client, &run_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["outputs"]["double"]["output"]["y"], json!(6));
    assert_eq!(finished["outputs"]["check"]["output"]["result"], json!(true));

    // Step 4: logs exist for the run
    let logs: Value = client
        .get(format!("{}/api/runs/{}/logs", API_BASE_URL, run_id))
        .send()
        .await
        .expect("get logs")
        .json()
        .await
        .expect("parse logs");
    assert!(logs.as_array().map(|a| !a.is_empty()).unwrap_or(false));

    // Step 5: cascade delete
    let delete_response = client
        .delete(format!("{}/api/flows/{}", API_BASE_URL, flow_id))
        .send()
        .await
        .expect("delete flow");
    assert_eq!(delete_response.status(), 204);
}

#[tokio::test]
#[ignore]
async fn cyclic_specs_are_rejected_with_400() {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/flows", API_BASE_URL))
        .json(&json!({
            "name": format!("it-cycle-{}", uuid_suffix()),
            "spec": {
                "nodes": [
                    { "id": "a", "type": "nodes.transform.execute", "params": { "code": "outputs.x = 1" } },
                    { "id": "b", "type": "nodes.transform.execute", "params": { "code": "outputs.x = 2" } }
                ],
                "edges": [ { "from": "a", "to": "b" }, { "from": "b", "to": "a" } ]
            }
        }))
        .send()
        .await
        .expect("create flow");
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("parse error body");
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("cycle"));
}

#[tokio::test]
#[ignore]
async fn webhook_trigger_round_trip() {
    let client = reqwest::Client::new();
    let path = format!("/it-hook-{}", uuid_suffix());

    let create_response = client
        .post(format!("{}/api/flows", API_BASE_URL))
        .json(&json!({
            "name": format!("it-webhook-{}", uuid_suffix()),
            "spec": {
                "nodes": [
                    { "id": "hook", "type": "nodes.webhook.trigger",
                      "params": { "path": path, "method": "POST" } }
                ],
                "edges": []
            }
        }))
        .send()
        .await
        .expect("create flow");
    assert_eq!(create_response.status(), 201);

    // Matching request is accepted with a run id
    let hook_response = client
        .post(format!("{}/webhook{}", API_BASE_URL, path))
        .json(&json!({ "q": "hi" }))
        .send()
        .await
        .expect("trigger webhook");
    assert_eq!(hook_response.status(), 202);
    let accepted: Value = hook_response.json().await.expect("parse body");
    let run_id = accepted["run_id"].as_str().expect("run id").to_string();

    let run = wait_for_terminal(&client, &run_id).await;
    assert_eq!(run["status"], "completed");
    assert_eq!(run["inputs"]["body"], json!({ "q": "hi" }));
    assert_eq!(run["inputs"]["method"], "POST");

    // Unknown paths 404
    let miss = client
        .get(format!("{}/webhook/it-unknown-{}", API_BASE_URL, uuid_suffix()))
        .send()
        .await
        .expect("miss webhook");
    assert_eq!(miss.status(), 404);
}

#[tokio::test]
#[ignore]
async fn retention_dry_run_reports_without_deleting() {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/admin/retention/cleanup", API_BASE_URL))
        .json(&json!({ "dryRun": true }))
        .send()
        .await
        .expect("dry-run cleanup");
    assert_eq!(response.status(), 200);
    let report: Value = response.json().await.expect("parse report");
    assert_eq!(report["dry_run"], json!(true));
    let deleted = &report["deleted"];
    assert_eq!(deleted["runs_successful"], json!(0));

    let latest: Value = client
        .get(format!("{}/api/admin/retention/latest", API_BASE_URL))
        .send()
        .await
        .expect("latest audit")
        .json()
        .await
        .expect("parse audit");
    assert_eq!(latest["dry_run"], json!(true));
}

fn uuid_suffix() -> String {
    uuid::Uuid::now_v7().simple().to_string()[..12].to_string()
}
