//! Operator HTTP facade.
//!
//! The operational surface the daemon itself needs: fleet summary, per-device
//! state, and replicator start/stop. No auth and no persistence; this is not
//! the management web product.

use crate::application::control::{
    ControlService, DEFAULT_SETTLE_DELAY, DEFAULT_VERIFY_DEADLINE, DEFAULT_VERIFY_INTERVAL,
};
use crate::application::fleet::FleetService;
use crate::domain::encoder::{Encoder, EncoderId};
use crate::domain::health::HealthThresholds;
use crate::domain::replicator::Channel;
use crate::ports::device::{DeviceError, DeviceFactory};
use crate::ports::registry::EncoderRegistry;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub struct ApiState<C, R> {
    pub fleet: Arc<FleetService<C, R>>,
    pub thresholds: HealthThresholds,
    settle_delay: Duration,
    verify_deadline: Duration,
    verify_interval: Duration,
}

impl<C, R> ApiState<C, R>
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    pub fn new(fleet: Arc<FleetService<C, R>>) -> Self {
        Self {
            fleet,
            thresholds: HealthThresholds::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            verify_deadline: DEFAULT_VERIFY_DEADLINE,
            verify_interval: DEFAULT_VERIFY_INTERVAL,
        }
    }

    pub fn with_control_timing(
        mut self,
        settle_delay: Duration,
        verify_deadline: Duration,
        verify_interval: Duration,
    ) -> Self {
        self.settle_delay = settle_delay;
        self.verify_deadline = verify_deadline;
        self.verify_interval = verify_interval;
        self
    }

    fn control(&self, encoder: &Encoder) -> ControlService<C::Device> {
        ControlService::with_timing(
            self.fleet.device_for(encoder),
            self.settle_delay,
            self.verify_deadline,
            self.verify_interval,
        )
    }
}

type ApiError = (StatusCode, String);
type Reply = Result<Json<Value>, ApiError>;

pub fn router<C, R>(state: Arc<ApiState<C, R>>) -> Router
where
    C: DeviceFactory + 'static,
    R: EncoderRegistry + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/summary", get(summary::<C, R>))
        .route("/encoders", get(list_encoders::<C, R>))
        .route("/encoders/:id", get(encoder_detail::<C, R>))
        .route("/encoders/:id/stream/start", post(stream_start::<C, R>))
        .route("/encoders/:id/stream/stop", post(stream_stop::<C, R>))
        .route("/encoders/:id/record/start", post(record_start::<C, R>))
        .route("/encoders/:id/record/stop", post(record_stop::<C, R>))
        .layer(cors)
        .with_state(state)
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn device_failure(e: DeviceError) -> ApiError {
    let status = match e {
        DeviceError::Verify { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

async fn lookup<C, R>(state: &ApiState<C, R>, id: Uuid) -> Result<Encoder, ApiError>
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    state
        .fleet
        .registry()
        .get(EncoderId(id))
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, format!("no encoder {}", id)))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn summary<C, R>(State(state): State<Arc<ApiState<C, R>>>) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    let summary = state.fleet.summary().await.map_err(internal)?;
    Ok(Json(serde_json::to_value(summary).map_err(internal)?))
}

async fn list_encoders<C, R>(State(state): State<Arc<ApiState<C, R>>>) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    let registry = state.fleet.registry();
    let mut body = Vec::new();
    for encoder in registry.list().await.map_err(internal)? {
        let connection = registry
            .connection_state(encoder.id)
            .await
            .map_err(internal)?;
        body.push(json!({
            "id": encoder.id,
            "name": encoder.name,
            "base_url": encoder.base_url,
            "connection_state": connection,
        }));
    }
    Ok(Json(Value::Array(body)))
}

async fn encoder_detail<C, R>(
    State(state): State<Arc<ApiState<C, R>>>,
    Path(id): Path<Uuid>,
) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    let encoder = lookup(&state, id).await?;
    let registry = state.fleet.registry();
    let connection = registry
        .connection_state(encoder.id)
        .await
        .map_err(internal)?;
    let snapshot = registry
        .latest_snapshot(encoder.id)
        .await
        .map_err(internal)?;
    let health = snapshot.as_ref().map(|s| state.thresholds.evaluate(s));

    Ok(Json(json!({
        "id": encoder.id,
        "name": encoder.name,
        "base_url": encoder.base_url,
        "connection_state": connection,
        "snapshot": snapshot,
        "health": health,
    })))
}

async fn drive<C, R>(
    state: Arc<ApiState<C, R>>,
    id: Uuid,
    channel: Channel,
    start: bool,
) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    let encoder = lookup(&state, id).await?;
    let control = state.control(&encoder);
    let result = match (channel, start) {
        (Channel::Stream, true) => control.start_streaming().await,
        (Channel::Stream, false) => control.stop_streaming().await,
        (Channel::Record, true) => control.start_recording().await,
        (Channel::Record, false) => control.stop_recording().await,
    };
    result.map_err(device_failure)?;
    Ok(Json(json!({
        "id": encoder.id,
        "channel": channel,
        "running": start,
    })))
}

async fn stream_start<C, R>(State(state): State<Arc<ApiState<C, R>>>, Path(id): Path<Uuid>) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    drive(state, id, Channel::Stream, true).await
}

async fn stream_stop<C, R>(State(state): State<Arc<ApiState<C, R>>>, Path(id): Path<Uuid>) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    drive(state, id, Channel::Stream, false).await
}

async fn record_start<C, R>(State(state): State<Arc<ApiState<C, R>>>, Path(id): Path<Uuid>) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    drive(state, id, Channel::Record, true).await
}

async fn record_stop<C, R>(State(state): State<Arc<ApiState<C, R>>>, Path(id): Path<Uuid>) -> Reply
where
    C: DeviceFactory,
    R: EncoderRegistry + 'static,
{
    drive(state, id, Channel::Record, false).await
}
