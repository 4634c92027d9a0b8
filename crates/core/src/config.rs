use serde::Deserialize;

use crate::error::{CampaignError, CampaignResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_SYNC__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub ads: AdServiceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Advertising platform connection. The platform is simulated, so the
/// credentials only end up in logs.
#[derive(Debug, Clone, Deserialize)]
pub struct AdServiceConfig {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_profile_id")]
    pub profile_id: String,
    #[serde(default = "default_region")]
    pub region: AdRegion,
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: u64,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    /// Fixed RNG seed for reproducible simulations.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdRegion {
    Na,
    Eu,
    Fe,
}

impl AdRegion {
    pub fn base_url(&self) -> &'static str {
        match self {
            AdRegion::Na => "https://advertising-api.amazon.com",
            AdRegion::Eu => "https://advertising-api-eu.amazon.com",
            AdRegion::Fe => "https://advertising-api-fe.amazon.com",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: usize,
    /// Run a sweep before serving campaign listings.
    #[serde(default = "default_lazy_sync")]
    pub lazy_sync: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_client_id() -> String {
    "mock-client-id".to_string()
}
fn default_profile_id() -> String {
    "mock-profile-id".to_string()
}
fn default_region() -> AdRegion {
    AdRegion::Na
}
fn default_error_rate() -> f64 {
    0.2
}
fn default_min_latency_ms() -> u64 {
    100
}
fn default_max_latency_ms() -> u64 {
    500
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    2_000
}
fn default_max_backoff_ms() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_call_timeout_ms() -> u64 {
    30_000
}
fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_sweep_enabled() -> bool {
    true
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_sweep_batch_size() -> usize {
    500
}
fn default_lazy_sync() -> bool {
    false
}
fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for AdServiceConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            profile_id: default_profile_id(),
            region: default_region(),
            error_rate: default_error_rate(),
            min_latency_ms: default_min_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
            seed: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            interval_secs: default_sweep_interval_secs(),
            batch_size: default_sweep_batch_size(),
            lazy_sync: default_lazy_sync(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            ads: AdServiceConfig::default(),
            retry: RetryConfig::default(),
            dispatcher: DispatcherConfig::default(),
            sweep: SweepConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> CampaignResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CAMPAIGN_SYNC")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CampaignError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> CampaignResult<()> {
        if !(0.0..=1.0).contains(&self.ads.error_rate) {
            return Err(CampaignError::Config(format!(
                "ads.error_rate must be within [0, 1], got {}",
                self.ads.error_rate
            )));
        }
        if self.ads.min_latency_ms > self.ads.max_latency_ms {
            return Err(CampaignError::Config(
                "ads.min_latency_ms must not exceed ads.max_latency_ms".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CampaignError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.workers == 0 || self.dispatcher.queue_capacity == 0 {
            return Err(CampaignError::Config(
                "dispatcher.workers and dispatcher.queue_capacity must be positive".to_string(),
            ));
        }
        if self.sweep.interval_secs == 0 {
            return Err(CampaignError::Config(
                "sweep.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.sweep.batch_size == 0 {
            return Err(CampaignError::Config(
                "sweep.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
