//! HTTP API tests against an in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use runrelay_controller::{
    api,
    state::AppState,
    store::{MemoryRunStore, RunStore},
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, Arc<dyn RunStore>) {
    let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
    (api::create_router(AppState::new(store.clone())), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn post_run(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/runs")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn jenkins_run(name: &str) -> Value {
    json!({
        "namespace": "default",
        "name": name,
        "spec": {
            "ref": {"apiVersion": "jenkins.tekton.dev/v0", "kind": "JenkinsJob"},
            "params": [{"name": "url", "value": "http://jenkins/job/demo"}]
        }
    })
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _) = app();

    let (status, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "run-controller");

    let (status, body) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_create_and_get_run() {
    let (app, store) = app();

    let (status, body) = send(&app, post_run(jenkins_run("build-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["key"], json!({"namespace": "default", "name": "build-1"}));
    assert_eq!(body["resourceVersion"], 1);
    assert_eq!(body["status"]["condition"]["state"], "Pending");
    assert!(body["status"].get("startTime").is_none());

    let (status, body) = send(&app, get("/v1/runs/default/build-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["spec"]["params"][0]["value"], "http://jenkins/job/demo");

    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_duplicate_conflicts() {
    let (app, _) = app();

    let (status, _) = send(&app, post_run(jenkins_run("build-1"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, post_run(jenkins_run("build-1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "run_exists");
}

#[tokio::test]
async fn test_create_rejects_invalid_key() {
    let (app, _) = app();

    let (status, body) = send(&app, post_run(json!({"namespace": "Bad_NS", "name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_run_key");
}

#[tokio::test]
async fn test_create_rejects_malformed_body() {
    let (app, _) = app();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/runs")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_body");
}

#[tokio::test]
async fn test_list_and_missing_run() {
    let (app, _) = app();

    send(&app, post_run(jenkins_run("b"))).await;
    send(&app, post_run(jenkins_run("a"))).await;

    let (status, body) = send(&app, get("/v1/runs")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["key"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    let (status, body) = send(&app, get("/v1/runs/default/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "run_not_found");
}
