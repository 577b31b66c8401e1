use crate::error::{PipelineError, PipelineResult};
use crate::models::report::{
    DeviceListResponse, DeviceReport, FleetReport, Interpretation, RefreshResponse,
    SubsetRefreshResponse,
};
use crate::services::interpret;
use crate::services::pipeline::PipelineService;
use crate::services::snapshot::SnapshotStore;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// State
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineService>,
    pub store: Arc<SnapshotStore>,
}

pub fn create_app(pipeline: Arc<PipelineService>, store: Arc<SnapshotStore>) -> Router {
    let state = AppState { pipeline, store };

    Router::new()
        .route("/health", get(health))
        .route("/verdicts", get(fleet_verdicts))
        .route("/refresh", post(refresh))
        .route("/refresh/devices", post(refresh_subset))
        .route("/devices/:device_id", get(device_detail))
        .route("/config/devices", get(list_devices))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// Routes
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn fleet_verdicts(State(state): State<AppState>) -> PipelineResult<Json<FleetReport>> {
    let snapshot = state
        .store
        .latest()
        .ok_or_else(|| PipelineError::NotFound("fleet snapshot".to_string()))?;

    let devices: Vec<Interpretation> = snapshot
        .devices
        .iter()
        .map(|(device_id, verdict)| interpret::interpret_device(device_id, verdict))
        .collect();
    let fleet = interpret::summarize_fleet(&devices);

    Ok(Json(FleetReport {
        generated_at: snapshot.generated_at,
        fleet,
        devices,
    }))
}

async fn refresh(State(state): State<AppState>) -> PipelineResult<Json<RefreshResponse>> {
    let summary = state.pipeline.run_full().await?;
    Ok(Json(RefreshResponse {
        records: summary.records,
        devices: summary.verdicts.len(),
    }))
}

#[derive(Deserialize)]
struct SubsetQuery {
    devices: String,
}

async fn refresh_subset(
    State(state): State<AppState>,
    Query(params): Query<SubsetQuery>,
) -> PipelineResult<Json<SubsetRefreshResponse>> {
    let devices = parse_device_list(&params.devices)?;
    let summary = state.pipeline.run_subset(&devices).await?;

    Ok(Json(SubsetRefreshResponse {
        records: summary.records,
        devices: summary.verdicts.keys().cloned().collect(),
    }))
}

async fn device_detail(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> PipelineResult<Json<DeviceReport>> {
    if !is_valid_device_id(&device_id) {
        return Err(PipelineError::InvalidRequest(format!(
            "malformed device id: {device_id}"
        )));
    }

    let snapshot = state
        .store
        .latest()
        .ok_or_else(|| PipelineError::NotFound("fleet snapshot".to_string()))?;
    let verdict = snapshot
        .devices
        .get(&device_id)
        .ok_or_else(|| PipelineError::NotFound(format!("device {device_id}")))?;

    Ok(Json(DeviceReport {
        generated_at: snapshot.generated_at,
        interpretation: interpret::interpret_device(&device_id, verdict),
    }))
}

async fn list_devices(State(state): State<AppState>) -> Json<DeviceListResponse> {
    Json(DeviceListResponse {
        devices: state.pipeline.configured_devices().to_vec(),
    })
}

fn is_valid_device_id(device_id: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
    re.is_match(device_id)
}

fn parse_device_list(raw: &str) -> PipelineResult<Vec<String>> {
    let devices: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect();

    if devices.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "no devices provided".to_string(),
        ));
    }
    if let Some(bad) = devices.iter().find(|device| !is_valid_device_id(device)) {
        return Err(PipelineError::InvalidRequest(format!(
            "malformed device id: {bad}"
        )));
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_list_is_split_and_trimmed() {
        let devices = parse_device_list(" device5 , device6 ,").unwrap();
        assert_eq!(devices, ["device5", "device6"]);
    }

    #[test]
    fn empty_device_list_is_rejected() {
        assert!(matches!(
            parse_device_list(" , "),
            Err(PipelineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn malformed_device_ids_are_rejected() {
        assert!(parse_device_list("device5,../etc").is_err());
        assert!(is_valid_device_id("device_5-a"));
        assert!(!is_valid_device_id("device 5"));
        assert!(!is_valid_device_id(""));
    }
}
