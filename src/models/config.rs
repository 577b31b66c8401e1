use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn load() -> Option<Self> {
        // Try to load from config.toml or config.json
        if let Ok(content) = std::fs::read_to_string("config.toml") {
            if let Ok(config) = toml::from_str(&content) {
                return Some(config);
            }
        }

        if let Ok(content) = std::fs::read_to_string("config.json") {
            if let Ok(config) = serde_json::from_str(&content) {
                return Some(config);
            }
        }

        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_base_url: String,
    pub devices: Vec<String>,
    pub timeout_secs: u64,
    pub max_concurrent_fetches: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://le3tvo1cgc.execute-api.us-east-1.amazonaws.com/prod/get-data"
                .to_string(),
            devices: vec![
                "device5".to_string(),
                "device6".to_string(),
                "device7".to_string(),
                "device8".to_string(),
            ],
            timeout_secs: 30,
            max_concurrent_fetches: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sigma multiplier for the high/low threshold band.
    pub threshold_multiplier: f64,
    /// Factor above the temperature high bound that escalates to critical.
    pub temperature_escalation: f64,
    /// Factor above the current high bound that escalates to high.
    pub current_escalation: f64,
    /// Trailing window for the recent-activity extract, relative to the
    /// newest reading in the batch.
    pub recent_window_minutes: i64,
    /// Directory for the persisted snapshot and exports.
    pub output_dir: String,
    /// Interval for the background full-pipeline refresh; 0 disables it.
    pub refresh_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold_multiplier: 2.5,
            temperature_escalation: 1.15,
            current_escalation: 1.25,
            recent_window_minutes: 20,
            output_dir: "data".to_string(),
            refresh_interval_secs: 0,
        }
    }
}
