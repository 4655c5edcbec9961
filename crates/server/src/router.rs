use axum::{
    Router,
    routing::{get, post},
};
use junction_core::RunId;
use junction_runner::{AbortHandle, PeerSet, RunController};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;

use crate::error::ApiError;
use crate::handlers;

/// The run currently served by the API
pub struct RunSlot {
    pub run_id: RunId,
    pub controller: Mutex<RunController>,
    /// Usable without the controller lock while a round is in flight
    pub abort: AbortHandle,
    /// Guarded peers for pass-through queries, also lock free
    pub peers: PeerSet,
    driving: AtomicBool,
}

impl RunSlot {
    pub fn new(controller: RunController) -> Self {
        RunSlot {
            run_id: controller.run_id(),
            abort: controller.abort_handle(),
            peers: controller.peers().clone(),
            controller: Mutex::new(controller),
            driving: AtomicBool::new(false),
        }
    }

    /// True while a background task is running the rounds
    pub fn is_driving(&self) -> bool {
        self.driving.load(Ordering::Acquire)
    }

    /// Claim the slot for a background driver
    pub(crate) fn try_drive(&self) -> bool {
        self.driving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.driving.store(false, Ordering::Release);
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub client: reqwest::Client,
    run: RwLock<Option<Arc<RunSlot>>>,
}

impl AppState {
    pub fn new(client: reqwest::Client) -> Self {
        AppState {
            client,
            run: RwLock::new(None),
        }
    }

    /// State already serving a configured run
    pub fn with_controller(client: reqwest::Client, controller: RunController) -> Self {
        AppState {
            client,
            run: RwLock::new(Some(Arc::new(RunSlot::new(controller)))),
        }
    }

    /// Replace the served run, unless the current one is being driven
    pub async fn install(&self, controller: RunController) -> Result<Arc<RunSlot>, ApiError> {
        let mut run = self.run.write().await;
        if run.as_ref().is_some_and(|slot| slot.is_driving()) {
            return Err(ApiError::run_in_progress());
        }
        let slot = Arc::new(RunSlot::new(controller));
        *run = Some(slot.clone());
        Ok(slot)
    }

    pub async fn current(&self) -> Result<Arc<RunSlot>, ApiError> {
        self.run.read().await.clone().ok_or_else(ApiError::no_run)
    }
}

/// Create the control API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        // Lifecycle
        .route("/setup", post(handlers::setup))
        .route("/start", post(handlers::start))
        .route("/peek", get(handlers::peek))
        .route("/step", post(handlers::step))
        .route("/run", post(handlers::run))
        .route("/abort", post(handlers::abort))
        .route("/finish", post(handlers::finish))
        // Observation
        .route("/status", get(handlers::status))
        .route("/events", get(handlers::events))
        // Pass-through queries
        .route("/plan", post(handlers::plan))
        .route("/reservable", get(handlers::reservable))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
