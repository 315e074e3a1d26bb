// Integration tests for the work-queue facade.
// Run with: cargo test --test integration_test -- --ignored
// (requires the server running locally with DATABASE_URL configured)

use coordinator_contracts::{AddTaskResponse, LeaseResponse, SuccessResponse};
use serde_json::json;

const API_BASE_URL: &str = "http://localhost:8080";

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_add_lease_heartbeat_finish_round_trip() {
    let client = reqwest::Client::new();
    let queue = "integration-test-queue";

    println!("📝 Step 1: Adding a task...");
    let add_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/add"))
        .json(&json!({ "payload": {"greeting": "hi"} }))
        .send()
        .await
        .expect("Failed to add task");
    assert_eq!(add_response.status(), 201);
    let added: AddTaskResponse = add_response.json().await.expect("Failed to parse response");
    println!("✅ Added task {}", added.task_id);

    println!("📝 Step 2: Re-adding the same task_id is a conflict...");
    let conflict_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/add"))
        .json(&json!({ "payload": {"greeting": "hi"}, "task_id": added.task_id }))
        .send()
        .await
        .expect("Failed to re-add task");
    assert_eq!(conflict_response.status(), 409);

    println!("📝 Step 3: Leasing the task...");
    let lease_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/lease"))
        .json(&json!({ "owner": "worker-1", "count": 1, "timeout_secs": 60 }))
        .send()
        .await
        .expect("Failed to lease task");
    assert_eq!(lease_response.status(), 200);
    let leased: LeaseResponse = lease_response.json().await.expect("Failed to parse response");
    assert_eq!(leased.tasks.len(), 1);
    assert_eq!(leased.tasks[0].task_id, added.task_id);
    println!("✅ Leased task {}", leased.tasks[0].task_id);

    println!("📝 Step 4: Heartbeating as a non-owner is rejected...");
    let bad_heartbeat = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/heartbeat"))
        .json(&json!({ "task_id": added.task_id, "owner": "someone-else", "message": "progress", "index": 1 }))
        .send()
        .await
        .expect("Failed to send heartbeat");
    assert_eq!(bad_heartbeat.status(), 409);

    println!("📝 Step 5: Heartbeating as the owner succeeds...");
    let heartbeat_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/heartbeat"))
        .json(&json!({ "task_id": added.task_id, "owner": "worker-1", "message": "halfway there", "index": 1 }))
        .send()
        .await
        .expect("Failed to send heartbeat");
    assert_eq!(heartbeat_response.status(), 200);
    let ack: SuccessResponse = heartbeat_response.json().await.expect("Failed to parse response");
    assert!(ack.success);

    println!("📝 Step 6: Finishing the task...");
    let finish_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/finish"))
        .json(&json!({ "task_id": added.task_id, "owner": "worker-1" }))
        .send()
        .await
        .expect("Failed to finish task");
    assert_eq!(finish_response.status(), 200);

    println!("📝 Step 7: Listing recent tasks shows it as done...");
    let list_response = client
        .get(format!("{API_BASE_URL}/api/work_queue/{queue}"))
        .send()
        .await
        .expect("Failed to list queue");
    assert_eq!(list_response.status(), 200);
    let tasks: Vec<serde_json::Value> = list_response.json().await.expect("Failed to parse response");
    let found = tasks
        .iter()
        .find(|t| t["task_id"] == json!(added.task_id))
        .expect("finished task should still appear in the list");
    assert_eq!(found["status"], "done");

    println!("✅ Full add → lease → heartbeat → finish round trip succeeded");
}

#[tokio::test]
#[ignore]
async fn test_finish_rejects_non_owner() {
    let client = reqwest::Client::new();
    let queue = "integration-test-ownership-queue";

    let add_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/add"))
        .json(&json!({ "payload": {} }))
        .send()
        .await
        .expect("Failed to add task");
    let added: AddTaskResponse = add_response.json().await.expect("Failed to parse response");

    client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/lease"))
        .json(&json!({ "owner": "worker-a", "count": 1 }))
        .send()
        .await
        .expect("Failed to lease task");

    let finish_response = client
        .post(format!("{API_BASE_URL}/api/work_queue/{queue}/finish"))
        .json(&json!({ "task_id": added.task_id, "owner": "worker-b" }))
        .send()
        .await
        .expect("Failed to finish task");
    assert_eq!(finish_response.status(), 409);
}
