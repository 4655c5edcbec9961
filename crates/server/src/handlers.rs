use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use junction_core::{PeerId, SimTime};
use junction_runner::{RoundOutcome, RunController, RunReport, ScenarioSettings};
use log::{error, info};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::dto::{
    EventsQuery, PeekResponse, ReservableQuery, ReservableResponse, RunAccepted, RunQuery,
    SetupResponse, StepResponse,
};
use crate::error::ApiError;
use crate::router::{AppState, RunSlot};

/// Slot that no background driver currently owns
async fn idle_slot(state: &AppState) -> Result<Arc<RunSlot>, ApiError> {
    let slot = state.current().await?;
    if slot.is_driving() {
        return Err(ApiError::run_in_progress());
    }
    Ok(slot)
}

/// GET /ping - Liveness check
pub async fn ping() -> Json<Value> {
    Json(json!({}))
}

/// POST /setup - Configure a new run from scenario settings
pub async fn setup(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<ScenarioSettings>,
) -> Result<(StatusCode, Json<SetupResponse>), ApiError> {
    let controller = RunController::from_settings(&settings, &state.client)?;
    let peers = controller
        .registry()
        .iter()
        .map(|peer| peer.id.clone())
        .collect();
    let slot = state.install(controller).await?;
    info!("Run {} configured", slot.run_id);

    Ok((
        StatusCode::CREATED,
        Json(SetupResponse {
            run_id: slot.run_id,
            peers,
        }),
    ))
}

/// POST /start - Probe the peers and start the clock
///
/// A failed probe is a run outcome, reported through the returned status.
pub async fn start(State(state): State<Arc<AppState>>) -> Result<Json<RunReport>, ApiError> {
    let slot = idle_slot(&state).await?;
    let mut controller = slot.controller.lock().await;
    match controller.setup().await {
        Ok(()) => {}
        Err(e) if e.failure_reason().is_some() => {}
        Err(e) => return Err(e.into()),
    }
    Ok(Json(controller.report()))
}

/// GET /peek - Time of the next round
pub async fn peek(State(state): State<Arc<AppState>>) -> Result<Json<PeekResponse>, ApiError> {
    let slot = idle_slot(&state).await?;
    let controller = slot.controller.lock().await;
    Ok(Json(PeekResponse::from_peek(controller.peek().await)))
}

/// POST /step - Run one round, finalizing once nothing is left
pub async fn step(State(state): State<Arc<AppState>>) -> Result<Json<StepResponse>, ApiError> {
    let slot = idle_slot(&state).await?;
    let mut controller = slot.controller.lock().await;
    let before = controller.events().len();

    let response = match controller.step().await? {
        RoundOutcome::Advanced(summary) => StepResponse {
            complete: false,
            round: Some(summary.index),
            time: Some(summary.time),
            events: summary.events,
        },
        RoundOutcome::Paused(next) => StepResponse {
            complete: false,
            round: None,
            time: Some(next),
            events: Vec::new(),
        },
        RoundOutcome::Complete => {
            controller.finalize().await?;
            StepResponse {
                complete: true,
                round: None,
                time: Some(controller.now()),
                events: controller.events()[before..].to_vec(),
            }
        }
    };
    Ok(Json(response))
}

/// POST /run?until= - Drive the run in the background
pub async fn run(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunQuery>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let until = query
        .until
        .map(|v| SimTime::new(v).ok_or_else(|| ApiError::invalid_parameter("until", "not finite")))
        .transpose()?;

    let slot = state.current().await?;
    if !slot.try_drive() {
        return Err(ApiError::run_in_progress());
    }

    let driver = slot.clone();
    tokio::spawn(async move {
        loop {
            // Lock per unit of work so status and abort stay responsive
            let more = driver.controller.lock().await.proceed(until).await;
            match more {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    error!("Run {} stopped: {}", driver.run_id, e);
                    break;
                }
            }
        }
        driver.release();
        info!("Run {} driver stopped", driver.run_id);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id: slot.run_id,
            until: query.until,
        }),
    ))
}

/// POST /abort - Stop the run before its next round
pub async fn abort(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let slot = state.current().await?;
    slot.abort.abort();
    info!("Run {} abort requested", slot.run_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": slot.run_id, "aborted": true })),
    ))
}

/// POST /finish - Flush the peers to the horizon and end the run
pub async fn finish(State(state): State<Arc<AppState>>) -> Result<Json<RunReport>, ApiError> {
    let slot = idle_slot(&state).await?;
    let mut controller = slot.controller.lock().await;
    if !controller.phase().is_terminal() {
        controller.finalize().await?;
    }
    Ok(Json(controller.report()))
}

/// GET /status - Run report
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<RunReport>, ApiError> {
    let slot = state.current().await?;
    let controller = slot.controller.lock().await;
    Ok(Json(controller.report()))
}

/// GET /events?since= - Merged timeline as JSON lines
pub async fn events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = state.current().await?;
    let controller = slot.controller.lock().await;

    let mut body = String::new();
    for merged in controller.events().iter().filter(|m| m.seqno >= query.since) {
        let line = serde_json::to_string(merged).map_err(|e| ApiError::internal(e.to_string()))?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body))
}

/// POST /plan - Route query forwarded to the planner
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Json(query): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let slot = state.current().await?;
    Ok(Json(slot.peers.plan(&query).await?))
}

/// GET /reservable?service=&org=&dst= - Ask a mobility peer about a trip
pub async fn reservable(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReservableQuery>,
) -> Result<Json<ReservableResponse>, ApiError> {
    let service = query
        .service
        .map(PeerId::from)
        .ok_or_else(|| ApiError::missing_parameter("service"))?;
    let org = query.org.ok_or_else(|| ApiError::missing_parameter("org"))?;
    let dst = query.dst.ok_or_else(|| ApiError::missing_parameter("dst"))?;

    let slot = state.current().await?;
    let reservable = slot.peers.reservable(&service, &org, &dst).await?;
    Ok(Json(ReservableResponse {
        service,
        reservable,
    }))
}
