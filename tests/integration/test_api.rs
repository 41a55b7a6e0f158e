//! End-to-end tests of the HTTP API
//!
//! Each test serves the demo course from an in-memory database on an
//! ephemeral port and talks to it over real HTTP.

use std::net::SocketAddr;

use lahendus_core::{create_router, AppState, Config, ROLE_HEADER, USER_HEADER};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Starts a server with the demo course and returns its `/v2` base URL.
async fn spawn_server() -> String {
    let state = AppState::open(Config::in_memory_demo()).expect("Failed to open demo database");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr: SocketAddr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, create_router(state))
            .await
            .expect("Server failed");
    });
    format!("http://{addr}/v2")
}

fn as_user(request: reqwest::RequestBuilder, user: &str, role: &str) -> reqwest::RequestBuilder {
    request.header(USER_HEADER, user).header(ROLE_HEADER, role)
}

/// Tests that identity headers are required and course access is checked.
#[tokio::test]
async fn test_identity_and_course_access() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let anonymous = client
        .get(format!("{base}/courses/1/basic"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(anonymous.status(), 401);

    let teacher = as_user(client.get(format!("{base}/courses/1/basic")), "ago", "teacher")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(teacher.status(), 200);
    let body: Value = teacher.json().await.expect("Invalid JSON");
    assert_eq!(body, json!({ "title": "Programming" }));

    let other_course = as_user(client.get(format!("{base}/courses/2/participants")), "ago", "teacher")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(other_course.status(), 403);
    let body: Value = other_course.json().await.expect("Invalid JSON");
    assert_eq!(body["code"], "NO_COURSE_ACCESS");
    assert_eq!(body["attrs"]["id"], "2");
}

/// Tests that adding students grants access to registered students and
/// creates pending accesses for the rest.
#[tokio::test]
async fn test_admin_adds_students_to_empty_course() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let added = as_user(client.post(format!("{base}/courses/2/students")), "admin", "admin")
        .json(&json!({ "students": [
            { "email": " Mari@Example.com ", "groups": [] },
            { "email": "new@example.com", "groups": [] },
        ]}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(added.status(), 200);
    let body: Value = added.json().await.expect("Invalid JSON");
    assert_eq!(body["accesses_added"], 1);
    assert_eq!(body["pending_accesses_added_updated"], 1);

    let participants: Value =
        as_user(client.get(format!("{base}/courses/2/participants")), "admin", "admin")
            .send()
            .await
            .expect("Request failed")
            .json()
            .await
            .expect("Invalid JSON");
    assert_eq!(participants["students"][0]["id"], "mari");
    assert_eq!(participants["students_pending"][0]["email"], "new@example.com");
}

/// Tests the exercise lists each role sees.
#[tokio::test]
async fn test_exercise_lists_by_role() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let student: Value = as_user(
        client.get(format!("{base}/student/courses/1/exercises")),
        "mari",
        "student",
    )
    .send()
    .await
    .expect("Request failed")
    .json()
    .await
    .expect("Invalid JSON");
    let titles: Vec<&str> = student["exercises"]
        .as_array()
        .expect("No exercises")
        .iter()
        .filter_map(|ex| ex["effective_title"].as_str())
        .collect();
    assert_eq!(titles, ["Hello", "Loops and lists"]);
    assert_eq!(student["exercises"][0]["status"], "COMPLETED");

    let teacher: Value = as_user(
        client.get(format!("{base}/teacher/courses/1/exercises")),
        "ago",
        "teacher",
    )
    .send()
    .await
    .expect("Request failed")
    .json()
    .await
    .expect("Invalid JSON");
    let exercises = teacher["exercises"].as_array().expect("No exercises");
    assert_eq!(exercises.len(), 3);
    assert_eq!(exercises[0]["completed_count"], 2);
    assert_eq!(exercises[0]["started_count"], 1);
    assert_eq!(exercises[2]["unstarted_count"], 3);

    let wrong_role = as_user(
        client.get(format!("{base}/teacher/courses/1/exercises")),
        "mari",
        "student",
    )
    .send()
    .await
    .expect("Request failed");
    assert_eq!(wrong_role.status(), 403);
}

/// Tests that a malformed id is reported with the offending parameter.
#[tokio::test]
async fn test_invalid_course_id() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let response = as_user(client.get(format!("{base}/courses/abc/basic")), "ago", "teacher")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(body["code"], "INVALID_PARAMETER_VALUE");
    assert_eq!(body["attrs"]["parameter"], "courseId");
    assert_eq!(body["attrs"]["value"], "abc");
}
