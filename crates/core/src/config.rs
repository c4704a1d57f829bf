use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SEGMENT_STUDIO__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub subscribers: SubscriberConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Live-preview tuning for the segment builder.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    /// Quiescence window applied to rule edits before an evaluation is issued.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Maximum number of matching subscribers returned alongside the count.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubscriberConfig {
    /// Optional JSON file (array of subscribers) loaded into the in-memory source at startup.
    #[serde(default)]
    pub seed_file: Option<String>,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_sample_size() -> usize {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            sample_size: default_sample_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            preview: PreviewConfig::default(),
            subscribers: SubscriberConfig::default(),
        }
    }
}

impl PreviewConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SEGMENT_STUDIO")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
