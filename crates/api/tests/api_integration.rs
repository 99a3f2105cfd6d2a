//! Integration tests for the saga host API.

use std::sync::OnceLock;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{Envelope, SagaConfig};
use saga_store::InMemorySagaStore;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    outbound: mpsc::Receiver<Envelope>,
}

impl TestApp {
    fn spawn() -> Self {
        let config = SagaConfig::default().with_command_destination("orders.commands");
        let host = api::create_default_state(InMemorySagaStore::new(), config).unwrap();
        tokio::spawn(host.runtime.run());

        let app = api::create_app(host.state, get_metrics_handle());
        Self {
            app,
            outbound: host.outbound,
        }
    }

    async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn launch(&self, body: Value) -> String {
        let (status, json) = self.request("POST", "/sagas", Some(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        json["saga_id"].as_str().unwrap().to_string()
    }

    async fn next_command(&mut self) -> Envelope {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .expect("no command dispatched")
            .unwrap()
    }

    /// Polls GET /sagas/{id} until it answers with `expected`.
    async fn wait_for_status(&self, saga_id: &str, expected: StatusCode) -> Value {
        for _ in 0..200 {
            let (status, json) = self.request("GET", &format!("/sagas/{saga_id}"), None).await;
            if status == expected {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("saga {saga_id} never reached {expected}");
    }
}

fn payload(name: &str) -> Value {
    json!({ "message_type": name, "body": { "name": name } })
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::spawn();

    let (status, json) = app.request("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["runtime"], "running");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::spawn();

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_launch_dispatches_first_command() {
    let mut app = TestApp::spawn();

    let saga_id = app
        .launch(json!({
            "saga_id": "order-1",
            "originating": payload("PlaceOrder"),
            "commands": [payload("ReserveStock"), payload("ChargeCard")],
            "abort_commands": [payload("ReleaseStock")]
        }))
        .await;
    assert_eq!(saga_id, "order-1");

    let envelope = app.next_command().await;
    assert_eq!(envelope.destination, "orders.commands");
    assert_eq!(envelope.payload.message_type, "ReserveStock");
    assert!(envelope.is_saga_step());

    let saga = app.wait_for_status("order-1", StatusCode::OK).await;
    assert_eq!(saga["phase"], "Forward");
    assert_eq!(saga["current_index"], 0);
    assert_eq!(saga["faulted"], false);
    assert_eq!(saga["current_command"], "ReserveStock");
    assert_eq!(saga["originating"], "PlaceOrder");
}

#[tokio::test]
async fn test_continue_until_completed() {
    let mut app = TestApp::spawn();

    app.launch(json!({
        "saga_id": "order-2",
        "commands": [payload("A"), payload("B")]
    }))
    .await;
    assert_eq!(app.next_command().await.payload.message_type, "A");

    let (status, _) = app.request("POST", "/sagas/order-2/continue", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(app.next_command().await.payload.message_type, "B");

    app.request("POST", "/sagas/order-2/continue", None).await;
    app.wait_for_status("order-2", StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn test_abort_runs_compensation() {
    let mut app = TestApp::spawn();

    app.launch(json!({
        "saga_id": "order-3",
        "commands": [payload("A"), payload("B")],
        "abort_commands": [payload("X"), payload("Y")]
    }))
    .await;
    assert_eq!(app.next_command().await.payload.message_type, "A");

    let (status, _) = app.request("POST", "/sagas/order-3/abort", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(app.next_command().await.payload.message_type, "X");

    let saga = app.wait_for_status("order-3", StatusCode::OK).await;
    assert_eq!(saga["phase"], "Compensating");
    assert_eq!(saga["current_command"], "X");
}

#[tokio::test]
async fn test_list_active_sagas() {
    let mut app = TestApp::spawn();

    for id in ["s-1", "s-2"] {
        app.launch(json!({ "saga_id": id, "commands": [payload("A")] }))
            .await;
        app.next_command().await;
    }
    app.wait_for_status("s-2", StatusCode::OK).await;

    let (status, json) = app.request("GET", "/sagas", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut ids: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["saga_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, ["s-1", "s-2"]);
}

#[tokio::test]
async fn test_launch_generates_saga_id() {
    let mut app = TestApp::spawn();

    let saga_id = app.launch(json!({ "commands": [payload("A")] })).await;

    assert!(!saga_id.is_empty());
    let envelope = app.next_command().await;
    assert_eq!(envelope.saga_id().unwrap().as_str(), saga_id);
}

#[tokio::test]
async fn test_blank_saga_id_rejected() {
    let app = TestApp::spawn();

    let (status, json) = app
        .request(
            "POST",
            "/sagas",
            Some(json!({ "saga_id": "  ", "commands": [payload("A")] })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_get_unknown_saga() {
    let app = TestApp::spawn();

    let (status, json) = app.request("GET", "/sagas/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_acknowledgment_for_unknown_saga_is_accepted() {
    let app = TestApp::spawn();

    let (status, _) = app.request("POST", "/sagas/nope/continue", None).await;

    assert_eq!(status, StatusCode::ACCEPTED);
}
