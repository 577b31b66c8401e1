use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Loosely-typed record as returned by the telemetry source. Field names are
/// alias-tolerant and case-insensitive; nothing past the normalizer sees this
/// shape.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// One normalized timestamped observation for a device.
///
/// Invariant: `current >= 0`; negative discharge current is clamped to zero
/// during normalization, not treated as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub current: f64,
    pub temperature: f64,
}

/// Ordinal anomaly tier. Declaration order is the precedence order
/// (`critical > high > medium > low`); `Ord` follows it so keyed maps
/// iterate highest tier first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Precedence order used for classification and dominant-severity
    /// selection.
    pub const ORDER: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Everything above `low` counts toward a device's anomaly total.
    pub fn is_anomalous(self) -> bool {
        !matches!(self, Severity::Low)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical bounds for one metric over one batch.
///
/// `std` is floored to 1.0 for zero-variance or single-sample batches so a
/// constant series never produces a zero-width band. Recomputed fresh every
/// run; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdProfile {
    pub mean: f64,
    pub std: f64,
    pub high: f64,
    pub low: f64,
}

/// A reading plus its anomaly flags and severity tier. Immutable once
/// produced by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedReading {
    #[serde(flatten)]
    pub reading: Reading,
    pub anomaly_current: bool,
    pub anomaly_temperature: bool,
    pub anomaly_combined: bool,
    pub severity: Severity,
}

/// Per-device severity tally for one run.
///
/// Invariants: `sum(severity_counts) == samples` and
/// `total_anomalies == samples - severity_counts[low]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceVerdict {
    pub severity_counts: BTreeMap<Severity, u64>,
    pub total_anomalies: u64,
    pub samples: u64,
}

/// Durable per-run output: one verdict per device, wholesale-replaced by the
/// next successful full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub generated_at: DateTime<Utc>,
    pub devices: BTreeMap<String, DeviceVerdict>,
}

/// What a pipeline run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub records: usize,
    pub verdicts: BTreeMap<String, DeviceVerdict>,
}
