use crate::error::{PipelineError, PipelineResult};
use crate::models::config::SourceConfig;
use crate::models::telemetry::RawRecord;
use async_trait::async_trait;
use serde_json::Value;

/// Upstream data source for raw device telemetry. Failures abort the run for
/// the requesting device; retry policy, if any, lives behind this seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self, device: &str) -> PipelineResult<Vec<RawRecord>>;
}

/// HTTP telemetry source. Expects the endpoint to take a `table` query param
/// (`?table=device5`) and return JSON records with at least datetime,
/// current and temperature fields.
pub struct HttpTelemetrySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelemetrySource {
    pub fn new(config: &SourceConfig) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cellguard/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Fetch {
                device: "<client>".to_string(),
                source: e,
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch(&self, device: &str) -> PipelineResult<Vec<RawRecord>> {
        let fetch_err = |e: reqwest::Error| PipelineError::Fetch {
            device: device.to_string(),
            source: e,
        };

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("table", device)])
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;

        let body: Value = response.json().await.map_err(fetch_err)?;
        unwrap_records(device, body)
    }
}

/// Accepts either a bare array of records or an envelope object carrying the
/// array under a `data` key.
fn unwrap_records(device: &str, body: Value) -> PipelineResult<Vec<RawRecord>> {
    let records = match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    let Value::Array(items) = records else {
        return Err(PipelineError::Payload {
            device: device.to_string(),
            detail: "expected a JSON array of records".to_string(),
        });
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(PipelineError::Payload {
                device: device.to_string(),
                detail: format!("expected record objects, got {}", value_kind(&other)),
            }),
        })
        .collect()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
