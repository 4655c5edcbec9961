//! Integration tests for the control API
//!
//! Drives runs over HTTP against in-process scripted peers:
//! - Stepping a run through its lifecycle
//! - Background runs, abort and the JSON-lines event log
//! - Error mapping for misuse
//! - Planner and reservability pass-through

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use junction_core::{EventKind, Peer, PeerKind, SimTime};
use junction_gateway::{Fault, Operation, ScriptedPeer};
use junction_runner::{RunConfig, RunController};
use junction_server::{AppState, create_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Test Fixtures
// ============================================================================

fn sim(id: &str) -> Peer {
    Peer::new(id, PeerKind::HttpSimulator, format!("http://localhost/{}", id))
}

/// P1 emits at 5 and 8, P2 at 5, a planner, horizon 10
fn create_test_state() -> Arc<AppState> {
    let p1 = ScriptedPeer::new("P1")
        .emit(5.0, EventKind::Departure, json!({"userId": "U1"}))
        .emit(8.0, EventKind::Arrival, json!({"userId": "U1"}));
    let p2 = ScriptedPeer::new("P2").emit(5.0, EventKind::Demand, json!({"userId": "U2"}));
    let planner = ScriptedPeer::new("PL").with_kind(PeerKind::Planner);

    let mut controller = RunController::new(RunConfig {
        horizon: SimTime::from(10),
        ..RunConfig::default()
    });
    controller.register(sim("P1"), Arc::new(p1)).unwrap();
    controller.register(sim("P2"), Arc::new(p2)).unwrap();
    controller
        .register(
            Peer::new("PL", PeerKind::Planner, "http://localhost/PL"),
            Arc::new(planner),
        )
        .unwrap();

    Arc::new(AppState::with_controller(reqwest::Client::new(), controller))
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, String) {
    let app = create_router(state.clone());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(state, request).await;
    (status, serde_json::from_str(&body).unwrap())
}

async fn post(state: &Arc<AppState>, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method("POST").uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let (status, body) = send(state, request).await;
    (status, serde_json::from_str(&body).unwrap())
}

/// Poll the status until the run reaches a terminal phase
async fn wait_terminal(state: &Arc<AppState>) -> Value {
    for _ in 0..200 {
        let (_, report) = get(state, "/status").await;
        if report["phase"] == "DONE" || report["phase"] == "FAILED" {
            return report;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not finish");
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_ping() {
    let state = Arc::new(AppState::new(reqwest::Client::new()));
    let (status, body) = get(&state, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_step_through_run() {
    let _ = env_logger::try_init();
    let state = create_test_state();

    let (status, report) = post(&state, "/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["phase"], "RUNNING");

    let (_, peek) = get(&state, "/peek").await;
    assert_eq!(peek["next_time"], 5.0);

    let (status, first) = post(&state, "/step", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["complete"], false);
    assert_eq!(first["time"], 5.0);
    let sources: Vec<_> = first["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["source"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(sources, vec!["P1", "P2"]);

    let (_, second) = post(&state, "/step", None).await;
    assert_eq!(second["time"], 8.0);
    assert_eq!(second["events"].as_array().unwrap().len(), 1);

    let (_, last) = post(&state, "/step", None).await;
    assert_eq!(last["complete"], true);

    let (_, report) = get(&state, "/status").await;
    assert_eq!(report["phase"], "DONE");
    assert_eq!(report["status"], "DONE");
    assert_eq!(report["events"], 3);

    let (_, peek) = get(&state, "/peek").await;
    assert_eq!(peek["next_time"], -1.0);
}

#[tokio::test]
async fn test_background_run_and_event_log() {
    let _ = env_logger::try_init();
    let state = create_test_state();

    let (status, accepted) = post(&state, "/run", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(accepted["run_id"].is_string());

    let report = wait_terminal(&state).await;
    assert_eq!(report["status"], "DONE");
    assert_eq!(report["current_time"], 10.0);

    let request = Request::builder().uri("/events").body(Body::empty()).unwrap();
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    let seqnos: Vec<_> = lines.iter().map(|l| l["seqno"].as_u64().unwrap()).collect();
    assert_eq!(seqnos, vec![0, 1, 2]);

    let request = Request::builder()
        .uri("/events?since=2")
        .body(Body::empty())
        .unwrap();
    let (_, tail) = send(&state, request).await;
    assert_eq!(tail.lines().count(), 1);
}

#[tokio::test]
async fn test_run_until_stops_early() {
    let state = create_test_state();

    let (status, _) = post(&state, "/run?until=5", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut report = Value::Null;
    for _ in 0..200 {
        let (_, current) = get(&state, "/status").await;
        if current["current_time"] == 5.0 {
            report = current;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(report["phase"], "RUNNING");

    // Driver released once it reached the bound
    let mut finished = Value::Null;
    for _ in 0..200 {
        let (status, body) = post(&state, "/finish", None).await;
        if status == StatusCode::OK {
            finished = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(finished["phase"], "DONE");
}

#[tokio::test]
async fn test_abort_fails_run() {
    let state = create_test_state();
    post(&state, "/start", None).await;

    let (status, body) = post(&state, "/abort", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["aborted"], true);

    let (status, error) = post(&state, "/step", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], -1004);

    let (_, report) = get(&state, "/status").await;
    assert_eq!(report["phase"], "FAILED");
    assert_eq!(report["reason"], "aborted");
}

// ============================================================================
// Configuration and errors
// ============================================================================

#[tokio::test]
async fn test_no_run_configured() {
    let state = Arc::new(AppState::new(reqwest::Client::new()));
    let (status, error) = get(&state, "/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], -1001);
}

#[tokio::test]
async fn test_setup_from_settings() {
    let state = Arc::new(AppState::new(reqwest::Client::new()));
    let settings = json!({
        "broker": {"type": "broker", "details": {"horizon": 60}},
        "walking": {"type": "http", "endpoint": "http://localhost:8003"},
        "user": {"type": "http", "endpoint": "http://localhost:8002", "priority": -1}
    });

    let (status, body) = post(&state, "/setup", Some(settings)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["peers"], json!(["user", "walking"]));

    let (_, report) = get(&state, "/status").await;
    assert_eq!(report["phase"], "INIT");
    assert_eq!(report["run_id"], body["run_id"]);
}

#[tokio::test]
async fn test_invalid_settings_rejected() {
    let state = Arc::new(AppState::new(reqwest::Client::new()));
    let settings = json!({
        "walking": {"type": "http", "endpoint": "http://localhost:8003"}
    });

    let (status, error) = post(&state, "/setup", Some(settings)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], -1101);
}

#[tokio::test]
async fn test_step_before_start_conflicts() {
    let state = create_test_state();
    let (status, error) = post(&state, "/step", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["code"], -1002);
}

#[tokio::test]
async fn test_run_until_must_be_finite() {
    let state = create_test_state();
    let (status, error) = post(&state, "/run?until=inf", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], -1100);
}

// ============================================================================
// Pass-through queries
// ============================================================================

#[tokio::test]
async fn test_plan_forwarded_to_planner() {
    let state = create_test_state();
    let (status, body) = post(&state, "/plan", Some(json!({"org": "A", "dst": "B"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"]["org"], "A");
}

#[tokio::test]
async fn test_reservable() {
    let state = create_test_state();

    let (status, body) = get(&state, "/reservable?service=P1&org=A&dst=B").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservable"], true);

    let (status, error) = get(&state, "/reservable?org=A&dst=B").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], -1102);

    let (status, error) = get(&state, "/reservable?service=P9&org=A&dst=B").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], -2001);
}

#[tokio::test]
async fn test_pass_through_answers_while_run_is_driven() {
    let _ = env_logger::try_init();
    let slow = ScriptedPeer::new("P1")
        .emit(5.0, EventKind::Departure, json!({"userId": "U1"}))
        .with_faults(
            Operation::Advance,
            1,
            Fault::Stall(Duration::from_millis(500)),
        );
    let planner = ScriptedPeer::new("PL").with_kind(PeerKind::Planner);
    let mut controller = RunController::new(RunConfig {
        horizon: SimTime::from(10),
        ..RunConfig::default()
    });
    controller.register(sim("P1"), Arc::new(slow)).unwrap();
    controller
        .register(
            Peer::new("PL", PeerKind::Planner, "http://localhost/PL"),
            Arc::new(planner),
        )
        .unwrap();
    let state = Arc::new(AppState::with_controller(reqwest::Client::new(), controller));

    let (status, _) = post(&state, "/run", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(state.current().await.unwrap().is_driving());

    // answered long before the stalled round releases the controller
    let (status, body) = tokio::time::timeout(
        Duration::from_millis(200),
        get(&state, "/reservable?service=P1&org=A&dst=B"),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservable"], true);

    let (status, body) = tokio::time::timeout(
        Duration::from_millis(200),
        post(&state, "/plan", Some(json!({"org": "A", "dst": "B"}))),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"]["org"], "A");

    let report = wait_terminal(&state).await;
    assert_eq!(report["phase"], "DONE");
}
