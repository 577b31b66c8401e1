use crate::error::PipelineResult;
use crate::models::config::{AppConfig, PipelineConfig};
use crate::models::telemetry::{
    ClassifiedReading, DeviceVerdict, FleetSnapshot, Reading, RunSummary, Severity,
    ThresholdProfile,
};
use crate::services::normalize;
use crate::services::snapshot::SnapshotStore;
use crate::services::source::TelemetrySource;
use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct PipelineService {
    config: PipelineConfig,
    devices: Vec<String>,
    fetch_limit: usize,
    source: Arc<dyn TelemetrySource>,
    store: Arc<SnapshotStore>,
}

impl PipelineService {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn TelemetrySource>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            config: config.pipeline.clone(),
            devices: config.source.devices.clone(),
            fetch_limit: config.source.max_concurrent_fetches.max(1),
            source,
            store,
        }
    }

    pub fn configured_devices(&self) -> &[String] {
        &self.devices
    }

    /// Full run over every configured device. Returns after the snapshot and
    /// the recent-window export are durably written.
    pub async fn run_full(&self) -> PipelineResult<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, devices = self.devices.len(), "Starting full pipeline run");

        let readings = self.load_devices(&self.devices).await?;
        let classified = classify_batch(&readings, &self.config);
        let verdicts = aggregate_verdicts(&classified);
        let recent = recent_window(&classified, self.config.recent_window_minutes);

        let snapshot = FleetSnapshot {
            generated_at: Utc::now(),
            devices: verdicts.clone(),
        };
        self.store.replace(snapshot).await?;
        self.store.export_recent(&recent).await?;

        info!(
            %run_id,
            records = classified.len(),
            recent = recent.len(),
            "Pipeline run committed"
        );

        Ok(RunSummary {
            records: classified.len(),
            verdicts,
        })
    }

    /// Ad-hoc run over a caller-specified subset, for inspection. Computes
    /// verdicts without touching the canonical snapshot.
    pub async fn run_subset(&self, devices: &[String]) -> PipelineResult<RunSummary> {
        let run_id = Uuid::new_v4();
        info!(%run_id, devices = devices.len(), "Starting subset pipeline run");

        let readings = self.load_devices(devices).await?;
        let classified = classify_batch(&readings, &self.config);
        let verdicts = aggregate_verdicts(&classified);

        Ok(RunSummary {
            records: classified.len(),
            verdicts,
        })
    }

    /// Fetch and normalize every requested device through a bounded worker
    /// pool. Any single failure aborts the whole run before anything is
    /// persisted.
    async fn load_devices(&self, devices: &[String]) -> PipelineResult<Vec<Reading>> {
        let batches: Vec<Vec<Reading>> = stream::iter(devices.iter().cloned().map(|device| async move {
            let records = self.source.fetch(&device).await?;
            normalize::normalize_device(&device, &records)
        }))
        .buffer_unordered(self.fetch_limit)
        .try_collect()
        .await?;

        Ok(batches.into_iter().flatten().collect())
    }
}

/// Mean and sample standard deviation over one metric's batch values.
///
/// Degenerate batches (fewer than two values, or zero variance) substitute
/// sigma 1.0 so a constant series never yields a zero-width band.
pub fn compute_thresholds(values: &[f64], multiplier: f64) -> ThresholdProfile {
    let n = values.len();
    let mean = if n == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / n as f64
    };

    let std = if n < 2 {
        1.0
    } else {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let sigma = variance.sqrt();
        if sigma == 0.0 {
            1.0
        } else {
            sigma
        }
    };

    ThresholdProfile {
        mean,
        std,
        high: mean + multiplier * std,
        low: (mean - multiplier * std).max(0.0),
    }
}

/// Thresholds are batch-global across devices: one shared sensitivity band
/// per run, so a single device's extremes shift the band for the whole
/// fleet.
pub fn classify_batch(readings: &[Reading], config: &PipelineConfig) -> Vec<ClassifiedReading> {
    let currents: Vec<f64> = readings.iter().map(|r| r.current).collect();
    let temperatures: Vec<f64> = readings.iter().map(|r| r.temperature).collect();

    let current = compute_thresholds(&currents, config.threshold_multiplier);
    let temperature = compute_thresholds(&temperatures, config.threshold_multiplier);
    debug!(?current, ?temperature, "Batch thresholds");

    readings
        .iter()
        .map(|reading| classify_reading(reading, &current, &temperature, config))
        .collect()
}

/// Strict priority cascade, first match wins: temperature escalation, then
/// current escalation, then any unescalated breach, then low.
pub fn classify_reading(
    reading: &Reading,
    current: &ThresholdProfile,
    temperature: &ThresholdProfile,
    config: &PipelineConfig,
) -> ClassifiedReading {
    let anomaly_current = reading.current > current.high;
    let anomaly_temperature = reading.temperature > temperature.high;
    let anomaly_combined = anomaly_current || anomaly_temperature;

    let severity = if anomaly_temperature
        && reading.temperature > temperature.high * config.temperature_escalation
    {
        Severity::Critical
    } else if anomaly_current && reading.current > current.high * config.current_escalation {
        Severity::High
    } else if anomaly_combined {
        Severity::Medium
    } else {
        Severity::Low
    };

    ClassifiedReading {
        reading: reading.clone(),
        anomaly_current,
        anomaly_temperature,
        anomaly_combined,
        severity,
    }
}

/// One verdict per device present in the batch. No state carries over
/// between runs; absent devices simply have no verdict.
pub fn aggregate_verdicts(classified: &[ClassifiedReading]) -> BTreeMap<String, DeviceVerdict> {
    let mut verdicts: BTreeMap<String, DeviceVerdict> = BTreeMap::new();

    for row in classified {
        let verdict = verdicts.entry(row.reading.device_id.clone()).or_default();
        *verdict.severity_counts.entry(row.severity).or_insert(0) += 1;
        if row.severity.is_anomalous() {
            verdict.total_anomalies += 1;
        }
        verdict.samples += 1;
    }

    verdicts
}

/// Readings within the trailing window measured from the newest timestamp in
/// the batch, not wall-clock time.
pub fn recent_window(classified: &[ClassifiedReading], minutes: i64) -> Vec<ClassifiedReading> {
    let Some(newest) = classified.iter().map(|row| row.reading.timestamp).max() else {
        return Vec::new();
    };
    let cutoff = newest - Duration::minutes(minutes);

    classified
        .iter()
        .filter(|row| row.reading.timestamp >= cutoff)
        .cloned()
        .collect()
}
