//! Integration test: HTTP adapters <-> fake peer services
//!
//! Each test hosts a small axum app speaking the peer protocol and drives
//! it through the real adapters.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use junction_core::{EventKind, Peer, PeerId, PeerKind, ReservationRequest, SimTime, TimeWindow};
use junction_gateway::{
    GuardedPeer, HealthBoard, PeerHealth, RetryPolicy, connect, messages::LogRecord,
};
use junction_ports::{Delivery, PeerError};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
struct FakeState {
    setup: Option<Value>,
    advances: Vec<f64>,
    triggered: Vec<Value>,
    uploads: Vec<Vec<LogRecord>>,
    finished: bool,
}

type Shared = Arc<Mutex<FakeState>>;

async fn setup(State(state): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    state.lock().unwrap().setup = Some(body);
    StatusCode::OK
}

async fn peek(State(state): State<Shared>) -> Json<Value> {
    let advanced = state.lock().unwrap().advances.len();
    // legacy idle marker once the single scripted time is consumed
    if advanced == 0 {
        Json(json!({"next_time": 5.0}))
    } else {
        Json(json!({"next": -1}))
    }
}

async fn advance(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let time = body["time"].as_f64().unwrap();
    state.lock().unwrap().advances.push(time);
    Json(json!({
        "events": [
            {"eventType": "DEPARTED", "details": {"userId": "U1"}},
            {"time": time, "eventType": "RESERVE", "service": "ondemand",
             "details": {"userId": "U1", "demandId": "D1"}}
        ]
    }))
}

async fn triggered(State(state): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    state.lock().unwrap().triggered.push(body);
    StatusCode::OK
}

async fn reservations(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "status": "confirmed",
        "resource_id": format!("car-{}", body["commuter_id"].as_str().unwrap()),
        "window": body["window"]
    }))
}

async fn reservable(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({"reservable": query.get("org") != query.get("dst")}))
}

async fn finish(State(state): State<Shared>) -> StatusCode {
    state.lock().unwrap().finished = true;
    StatusCode::OK
}

async fn upload(State(state): State<Shared>, Json(batch): Json<Vec<LogRecord>>) -> StatusCode {
    state.lock().unwrap().uploads.push(batch);
    StatusCode::OK
}

async fn plan(Json(query): Json<Value>) -> Json<Value> {
    Json(json!([{"org": query["org"], "dst": query["dst"], "legs": []}]))
}

async fn refusing() -> Json<Value> {
    Json(json!({"result": "nack", "reason": "fleet exhausted"}))
}

async fn garbled_answer() -> (StatusCode, &'static str) {
    (StatusCode::OK, "{\"result\": \"maybe\"}")
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::OK, "this is not json")
}

/// Start a fake peer and return its address and recorded state
async fn start_fake_peer() -> (SocketAddr, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/setup", post(setup))
        .route("/peek", get(peek))
        .route("/advance", post(advance))
        .route("/triggered", post(triggered))
        .route("/reservations", post(reservations))
        .route("/reservable", get(reservable))
        .route("/finish", post(finish))
        .route("/plan", post(plan))
        .route("/result/events/", post(upload))
        .route("/broken/peek", get(broken))
        .route("/refusing/triggered", post(refusing))
        .route("/garbled/triggered", post(garbled_answer))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

fn details(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_simulator_round_trip() {
    let _ = env_logger::try_init();
    let (addr, state) = start_fake_peer().await;

    let peer = Peer::new("user", PeerKind::HttpSimulator, format!("http://{}", addr))
        .with_details(details(json!({"scenario": "demo", "seed": 7})));
    let adapter = connect(&peer, &reqwest::Client::new()).unwrap();

    adapter.probe().await.unwrap();
    assert_eq!(state.lock().unwrap().setup, Some(json!({"scenario": "demo", "seed": 7})));

    assert_eq!(adapter.peek_next_event_time().await.unwrap(), Some(SimTime::from(5)));

    let events = adapter.advance_to(SimTime::from(5)).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].time, SimTime::from(5));
    assert_eq!(events[0].source, PeerId::from("user"));
    assert_eq!(events[0].kind, EventKind::Departure);
    assert_eq!(events[1].target, Some(PeerId::from("ondemand")));

    assert_eq!(adapter.peek_next_event_time().await.unwrap(), None);

    let delivery = adapter.deliver(&events[0]).await.unwrap();
    assert_eq!(delivery, Delivery::Ack);
    assert_eq!(state.lock().unwrap().triggered[0]["eventType"], "DEPARTED");

    adapter.finish().await.unwrap();
    assert!(state.lock().unwrap().finished);
}

#[tokio::test]
async fn test_mobility_queries() {
    let (addr, _state) = start_fake_peer().await;
    let peer = Peer::new("ondemand", PeerKind::HttpSimulator, format!("http://{}", addr));
    let adapter = connect(&peer, &reqwest::Client::new()).unwrap();

    let request = ReservationRequest {
        commuter_id: "U1".into(),
        demand_id: "D1".into(),
        mobility_peer_id: PeerId::from("ondemand"),
        resource_hint: None,
        window: TimeWindow::new(SimTime::from(10), SimTime::from(20)).unwrap(),
        details: Map::new(),
    };
    let answer = adapter.reserve(&request).await.unwrap();
    assert_eq!(answer.resource_id.as_deref(), Some("car-U1"));
    assert_eq!(answer.window, Some(request.window));

    assert!(adapter.reservable("A", "B").await.unwrap());
    assert!(!adapter.reservable("A", "A").await.unwrap());
}

#[tokio::test]
async fn test_planner_passthrough() {
    let (addr, _state) = start_fake_peer().await;
    let peer = Peer::new("planner", PeerKind::Planner, format!("http://{}", addr));
    let adapter = connect(&peer, &reqwest::Client::new()).unwrap();

    assert_eq!(adapter.peek_next_event_time().await.unwrap(), None);
    let routes = adapter.plan(&json!({"org": "A", "dst": "B", "dept": 480})).await.unwrap();
    assert_eq!(routes[0]["org"], "A");
}

#[tokio::test]
async fn test_writer_uploads_numbered_batches() {
    let (addr, state) = start_fake_peer().await;
    let peer = Peer::new("writer", PeerKind::BrokerWriter, format!("http://{}", addr));
    let adapter = connect(&peer, &reqwest::Client::new()).unwrap();

    adapter.probe().await.unwrap();
    let event = junction_core::Event::new(SimTime::from(1), "user", EventKind::Demand, Map::new());
    adapter.deliver(&event).await.unwrap();
    adapter.deliver(&event).await.unwrap();
    adapter.flush().await.unwrap();
    adapter.deliver(&event).await.unwrap();
    adapter.finish().await.unwrap();

    let recorded = state.lock().unwrap();
    // the probe uploads an empty batch
    let seqnos: Vec<Vec<u64>> = recorded
        .uploads
        .iter()
        .map(|batch| batch.iter().map(|r| r.seqno).collect())
        .collect();
    assert_eq!(seqnos, vec![vec![], vec![0, 1], vec![2]]);
}

#[tokio::test]
async fn test_malformed_response_degrades_peer() {
    let (addr, _state) = start_fake_peer().await;
    let peer = Peer::new("broken", PeerKind::HttpSimulator, format!("http://{}/broken", addr));
    let adapter = connect(&peer, &reqwest::Client::new()).unwrap();

    let health = HealthBoard::new();
    let guarded = GuardedPeer::new(adapter, RetryPolicy::default(), 3, health.clone());

    assert!(matches!(guarded.peek().await, Err(PeerError::Protocol(_))));
    assert_eq!(
        health.get(&PeerId::from("broken")),
        PeerHealth::Degraded {
            consecutive_failures: 1
        }
    );
}

#[tokio::test]
async fn test_unreachable_peer_is_transient() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let peer = Peer::new("gone", PeerKind::HttpSimulator, format!("http://{}", addr));
    let adapter = connect(&peer, &reqwest::Client::new()).unwrap();

    let err = adapter.peek_next_event_time().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_delivery_answers() {
    let _ = env_logger::try_init();
    let (addr, _state) = start_fake_peer().await;
    let client = reqwest::Client::new();
    let event = junction_core::Event::new(
        SimTime::from(5),
        "user",
        EventKind::Departure,
        details(json!({"userId": "U1"})),
    );

    let refusing = Peer::new("refusing", PeerKind::HttpSimulator, format!("http://{}/refusing", addr));
    let adapter = connect(&refusing, &client).unwrap();
    assert_eq!(
        adapter.deliver(&event).await.unwrap(),
        Delivery::Nack("fleet exhausted".into())
    );

    // an answer that is neither empty nor a delivery is not taken as an ack
    let garbled = Peer::new("garbled", PeerKind::HttpSimulator, format!("http://{}/garbled", addr));
    let adapter = connect(&garbled, &client).unwrap();
    assert!(matches!(
        adapter.deliver(&event).await,
        Err(PeerError::Protocol(_))
    ));
}
