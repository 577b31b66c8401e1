use crate::models::telemetry::Severity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Anomaly tally carried on a device interpretation.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalySummary {
    pub total: u64,
    pub breakdown: BTreeMap<Severity, u64>,
}

/// Human-facing view of one device's verdict, computed on read. Never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    pub device_id: String,
    pub status: &'static str,
    pub summary: &'static str,
    pub recommended_actions: Vec<&'static str>,
    pub anomalies: AnomalySummary,
}

/// Aggregate risk classification over all devices' dominant severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FleetHealth {
    #[serde(rename = "Critical Risk")]
    CriticalRisk,
    #[serde(rename = "Elevated Risk")]
    ElevatedRisk,
    Mixed,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub fleet_health: FleetHealth,
    pub distribution: BTreeMap<Severity, u64>,
    pub risk_summary: String,
    pub recommendation: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FleetReport {
    pub generated_at: DateTime<Utc>,
    pub fleet: FleetSummary,
    pub devices: Vec<Interpretation>,
}

#[derive(Debug, Serialize)]
pub struct DeviceReport {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub interpretation: Interpretation,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub records: usize,
    pub devices: usize,
}

#[derive(Debug, Serialize)]
pub struct SubsetRefreshResponse {
    pub records: usize,
    pub devices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<String>,
}
