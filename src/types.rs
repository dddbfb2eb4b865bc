use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models: ModelsConfig,
    pub inference: InferenceConfig,
    pub alert: AlertConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Fire-specialist model. Its detections drive the alert decision.
    pub fire: DetectorConfig,
    /// General-purpose model. Its detections are drawn on the display
    /// overlay and nothing else.
    pub context: DetectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub path: String,
    pub input_size: usize,
    pub confidence_threshold: f32,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub use_cuda: bool,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum seconds between sound alerts.
    pub cooldown_seconds: u64,
    pub sound_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub window_title: String,
    /// Passed to waitKey; also paces the polling loop.
    pub wait_key_ms: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One decoded frame in RGB order, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}
