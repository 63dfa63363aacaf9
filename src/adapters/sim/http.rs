//! Wire surface of the simulated device.
//!
//! Serves the same endpoints as real firmware so the HTTP adapter can be
//! exercised against an actual socket.

use super::SimDevice;
use crate::ports::device::DeviceError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router(sim: Arc<SimDevice>) -> Router {
    Router::new()
        .route("/config", get(config))
        .route("/descriptors", get(descriptors))
        .route("/logwatch.tmpl", get(logwatch))
        .with_state(sim)
}

#[derive(Debug, Deserialize)]
struct ConfigQuery {
    action: Option<String>,
    paramid: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptorQuery {
    paramid: String,
}

type Reply = Result<Json<Value>, (StatusCode, String)>;

fn fault_check(sim: &SimDevice) -> Result<(), (StatusCode, String)> {
    if sim.count_request() {
        Ok(())
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "injected failure".to_string(),
        ))
    }
}

fn device_error(err: DeviceError) -> (StatusCode, String) {
    let code = match err {
        DeviceError::Status { code } => {
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (code, err.to_string())
}

async fn config(State(sim): State<Arc<SimDevice>>, Query(query): Query<ConfigQuery>) -> Reply {
    fault_check(&sim)?;

    match (query.action.as_deref(), query.paramid) {
        // Bare GET /config is the liveness probe
        (None, None) => Ok(Json(sim.identity())),
        (Some("get"), Some(paramid)) => {
            let reading = sim.read_param(&paramid).map_err(device_error)?;
            Ok(Json(serde_json::to_value(reading).map_err(|e| {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            })?))
        }
        (Some("set"), Some(paramid)) => {
            let value = query.value.ok_or((
                StatusCode::BAD_REQUEST,
                "set requires a value".to_string(),
            ))?;
            let reading = sim.write_param(&paramid, &value).map_err(device_error)?;
            Ok(Json(serde_json::to_value(reading).map_err(|e| {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            })?))
        }
        _ => Err((
            StatusCode::BAD_REQUEST,
            "action must be get or set with a paramid".to_string(),
        )),
    }
}

async fn descriptors(
    State(sim): State<Arc<SimDevice>>,
    Query(query): Query<DescriptorQuery>,
) -> Reply {
    fault_check(&sim)?;
    // Real firmware answers with a one-element array
    let descriptor = super::descriptor_for(&query.paramid);
    Ok(Json(json!([descriptor])))
}

async fn logwatch(State(sim): State<Arc<SimDevice>>) -> Reply {
    fault_check(&sim)?;
    Ok(Json(
        serde_json::to_value(sim.logs())
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
    ))
}
