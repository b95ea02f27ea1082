//! Simulation settings.
//!
//! `Settings` describes the modeled network and CPU: throttling method, RTT and
//! throughput overrides, CPU slowdown, connection budgets, and the calibration
//! constants of the cost models. Settings can be built programmatically or
//! loaded from YAML/JSON.
//!
//! # Settings File Structure
//!
//! ```yaml
//! throttling_method: simulate
//! rtt_ms: 150
//! throughput_bps: 1677721.6
//! cpu_slowdown_multiplier: 4
//! connections_per_origin: 6
//! global_connections: 10
//! dns_lookup_ms: 30
//! tls_round_trips: 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::types::{Millis, Throughput};

/// Errors that can occur while loading or validating settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Default round-trip time when neither settings nor calibration provide one.
pub const DEFAULT_RTT_MS: Millis = 150.0;
/// Default link throughput: 1.6 Mbps.
pub const DEFAULT_THROUGHPUT_BPS: f64 = 1.6 * 1024.0 * 1024.0;
/// Layout tasks are throttled at half the CPU slowdown by default.
pub const DEFAULT_LAYOUT_TASK_SHARE: f64 = 0.5;
/// Initial TCP congestion window, in segments.
pub const DEFAULT_INITIAL_CONGESTION_WINDOW: f64 = 10.0;
/// HTTP/1.1 browsers open at most this many connections per origin.
pub const DEFAULT_CONNECTIONS_PER_ORIGIN: usize = 6;
/// Upper bound on concurrent requests across all origins.
pub const DEFAULT_GLOBAL_CONNECTIONS: usize = 10;
/// Single CPU tasks are never simulated longer than this.
pub const DEFAULT_MAX_CPU_TASK_MS: Millis = 10_000.0;
/// DNS resolution costs this many RTTs unless a fixed cost is configured.
pub const DNS_RTT_MULTIPLIER: f64 = 2.0;

/// How the observed load was throttled, which decides where the modeled
/// network and CPU parameters come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    /// Simulate the configured network and CPU from an unthrottled observation.
    #[default]
    Simulate,
    /// The observation already ran under the target conditions; replay them.
    Provided,
    /// The observation was throttled by the browser; treated like `Provided`.
    Devtools,
}

/// Complete simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub throttling_method: ThrottlingMethod,

    /// Round-trip time override. Used as-is under `simulate`.
    #[serde(default)]
    pub rtt_ms: Option<Millis>,

    /// Throughput override in bits per second. Used as-is under `simulate`.
    #[serde(default)]
    pub throughput_bps: Option<f64>,

    /// How much slower the modeled CPU is than the observed one.
    #[serde(default = "default_cpu_slowdown")]
    pub cpu_slowdown_multiplier: f64,

    /// Slowdown for layout tasks; defaults to half the CPU slowdown.
    #[serde(default)]
    pub layout_task_multiplier: Option<f64>,

    /// Maximum connections per origin.
    #[serde(default = "default_connections_per_origin")]
    pub connections_per_origin: usize,

    /// Maximum connections across all origins.
    #[serde(default = "default_global_connections")]
    pub global_connections: usize,

    /// Fixed DNS resolution cost; defaults to two RTTs.
    #[serde(default)]
    pub dns_lookup_ms: Option<Millis>,

    /// Extra round trips a fresh TLS connection pays (1 with False Start, 2 without).
    #[serde(default = "default_tls_round_trips")]
    pub tls_round_trips: u32,

    /// Initial TCP congestion window, in segments.
    #[serde(default = "default_initial_congestion_window")]
    pub initial_congestion_window: f64,

    /// Cap on a single simulated CPU task.
    #[serde(default = "default_max_cpu_task_ms")]
    pub max_cpu_task_ms: Millis,

    /// Server think time for origins calibration knows nothing about.
    #[serde(default)]
    pub server_response_time_ms: Millis,
}

fn default_cpu_slowdown() -> f64 {
    1.0
}

fn default_connections_per_origin() -> usize {
    DEFAULT_CONNECTIONS_PER_ORIGIN
}

fn default_global_connections() -> usize {
    DEFAULT_GLOBAL_CONNECTIONS
}

fn default_tls_round_trips() -> u32 {
    1
}

fn default_initial_congestion_window() -> f64 {
    DEFAULT_INITIAL_CONGESTION_WINDOW
}

fn default_max_cpu_task_ms() -> Millis {
    DEFAULT_MAX_CPU_TASK_MS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            throttling_method: ThrottlingMethod::default(),
            rtt_ms: None,
            throughput_bps: None,
            cpu_slowdown_multiplier: default_cpu_slowdown(),
            layout_task_multiplier: None,
            connections_per_origin: default_connections_per_origin(),
            global_connections: default_global_connections(),
            dns_lookup_ms: None,
            tls_round_trips: default_tls_round_trips(),
            initial_congestion_window: default_initial_congestion_window(),
            max_cpu_task_ms: default_max_cpu_task_ms(),
            server_response_time_ms: 0.0,
        }
    }
}

impl Settings {
    /// Creates default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow 4G on a mid-tier phone: 150 ms RTT, 1.6 Mbps, 4x CPU slowdown.
    pub fn mobile_slow_4g() -> Self {
        Self {
            rtt_ms: Some(150.0),
            throughput_bps: Some(1.6 * 1024.0 * 1024.0),
            cpu_slowdown_multiplier: 4.0,
            ..Self::default()
        }
    }

    /// Dense 4G on a desktop: 40 ms RTT, 10 Mbps, no CPU slowdown.
    pub fn desktop_dense_4g() -> Self {
        Self {
            rtt_ms: Some(40.0),
            throughput_bps: Some(10.0 * 1024.0 * 1024.0),
            cpu_slowdown_multiplier: 1.0,
            ..Self::default()
        }
    }

    /// Loads settings from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> SettingsResult<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads settings from a JSON string.
    pub fn from_json(json: &str) -> SettingsResult<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(SettingsError::UnknownFormat(ext.to_string())),
        }
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> SettingsResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> SettingsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates every field.
    pub fn validate(&self) -> SettingsResult<()> {
        if let Some(rtt) = self.rtt_ms {
            check_non_negative("rtt_ms", rtt)?;
        }
        if let Some(bps) = self.throughput_bps {
            if bps.is_nan() || bps <= 0.0 {
                return Err(SettingsError::Validation(format!(
                    "throughput_bps must be positive, got {}",
                    bps
                )));
            }
        }
        check_positive("cpu_slowdown_multiplier", self.cpu_slowdown_multiplier)?;
        if let Some(layout) = self.layout_task_multiplier {
            check_positive("layout_task_multiplier", layout)?;
        }
        if self.connections_per_origin == 0 {
            return Err(SettingsError::Validation(
                "connections_per_origin must be at least 1".to_string(),
            ));
        }
        if self.global_connections == 0 {
            return Err(SettingsError::Validation(
                "global_connections must be at least 1".to_string(),
            ));
        }
        if let Some(dns) = self.dns_lookup_ms {
            check_non_negative("dns_lookup_ms", dns)?;
        }
        if !(1..=2).contains(&self.tls_round_trips) {
            return Err(SettingsError::Validation(format!(
                "tls_round_trips must be 1 or 2, got {}",
                self.tls_round_trips
            )));
        }
        if self.initial_congestion_window.is_nan() || self.initial_congestion_window < 1.0 {
            return Err(SettingsError::Validation(format!(
                "initial_congestion_window must be at least 1 segment, got {}",
                self.initial_congestion_window
            )));
        }
        check_positive("max_cpu_task_ms", self.max_cpu_task_ms)?;
        check_non_negative("server_response_time_ms", self.server_response_time_ms)?;

        if self.throttling_method != ThrottlingMethod::Simulate
            && (self.rtt_ms.is_some() || self.throughput_bps.is_some())
        {
            tracing::warn!(
                "throttling method {:?} replays observed network conditions; \
                 rtt/throughput overrides are ignored",
                self.throttling_method
            );
        }
        Ok(())
    }

    /// CPU slowdown actually applied, given the throttling method.
    pub fn effective_cpu_multiplier(&self) -> f64 {
        match self.throttling_method {
            ThrottlingMethod::Simulate => self.cpu_slowdown_multiplier,
            ThrottlingMethod::Provided | ThrottlingMethod::Devtools => 1.0,
        }
    }

    /// Layout slowdown actually applied, given the throttling method.
    pub fn effective_layout_multiplier(&self) -> f64 {
        match self.throttling_method {
            ThrottlingMethod::Simulate => self
                .layout_task_multiplier
                .unwrap_or(self.cpu_slowdown_multiplier * DEFAULT_LAYOUT_TASK_SHARE),
            ThrottlingMethod::Provided | ThrottlingMethod::Devtools => 1.0,
        }
    }

    /// Throughput override as a typed value.
    pub fn throughput(&self) -> Option<Throughput> {
        self.throughput_bps.map(Throughput::from_bits_per_second)
    }
}

fn check_positive(name: &str, value: f64) -> SettingsResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SettingsError::Validation(format!(
            "{} must be positive and finite, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> SettingsResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SettingsError::Validation(format!(
            "{} must be non-negative and finite, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Builder for creating settings programmatically.
#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Creates a new builder starting from default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing settings, e.g. a preset.
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn throttling_method(mut self, method: ThrottlingMethod) -> Self {
        self.settings.throttling_method = method;
        self
    }

    pub fn rtt_ms(mut self, rtt: Millis) -> Self {
        self.settings.rtt_ms = Some(rtt);
        self
    }

    pub fn throughput_bps(mut self, bps: f64) -> Self {
        self.settings.throughput_bps = Some(bps);
        self
    }

    pub fn cpu_slowdown_multiplier(mut self, multiplier: f64) -> Self {
        self.settings.cpu_slowdown_multiplier = multiplier;
        self
    }

    pub fn layout_task_multiplier(mut self, multiplier: f64) -> Self {
        self.settings.layout_task_multiplier = Some(multiplier);
        self
    }

    pub fn connections_per_origin(mut self, connections: usize) -> Self {
        self.settings.connections_per_origin = connections;
        self
    }

    pub fn global_connections(mut self, connections: usize) -> Self {
        self.settings.global_connections = connections;
        self
    }

    pub fn dns_lookup_ms(mut self, cost: Millis) -> Self {
        self.settings.dns_lookup_ms = Some(cost);
        self
    }

    pub fn tls_round_trips(mut self, round_trips: u32) -> Self {
        self.settings.tls_round_trips = round_trips;
        self
    }

    pub fn initial_congestion_window(mut self, segments: f64) -> Self {
        self.settings.initial_congestion_window = segments;
        self
    }

    pub fn max_cpu_task_ms(mut self, cap: Millis) -> Self {
        self.settings.max_cpu_task_ms = cap;
        self
    }

    pub fn server_response_time_ms(mut self, ms: Millis) -> Self {
        self.settings.server_response_time_ms = ms;
        self
    }

    /// Builds and validates the settings.
    pub fn build(self) -> SettingsResult<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::new();
        assert_eq!(settings.throttling_method, ThrottlingMethod::Simulate);
        assert_eq!(settings.connections_per_origin, 6);
        assert_eq!(settings.global_connections, 10);
        assert_eq!(settings.tls_round_trips, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
throttling_method: simulate
rtt_ms: 50
throughput_bps: 10000000
cpu_slowdown_multiplier: 2
connections_per_origin: 4
dns_lookup_ms: 20
tls_round_trips: 2
"#;

        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.rtt_ms, Some(50.0));
        assert_eq!(settings.throughput_bps, Some(10_000_000.0));
        assert_eq!(settings.cpu_slowdown_multiplier, 2.0);
        assert_eq!(settings.connections_per_origin, 4);
        assert_eq!(settings.global_connections, 10);
        assert_eq!(settings.tls_round_trips, 2);
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{"throttling_method": "provided", "cpu_slowdown_multiplier": 4}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.throttling_method, ThrottlingMethod::Provided);
        assert_eq!(settings.effective_cpu_multiplier(), 1.0);
        assert_eq!(settings.effective_layout_multiplier(), 1.0);
    }

    #[test]
    fn test_layout_multiplier_defaults_to_half() {
        let settings = Settings::mobile_slow_4g();
        assert_eq!(settings.effective_cpu_multiplier(), 4.0);
        assert_eq!(settings.effective_layout_multiplier(), 2.0);
    }

    #[test]
    fn test_builder() {
        let settings = SettingsBuilder::new()
            .rtt_ms(50.0)
            .throughput_bps(8_000_000.0)
            .connections_per_origin(1)
            .build()
            .unwrap();

        assert_eq!(settings.rtt_ms, Some(50.0));
        assert_eq!(settings.throughput().unwrap().bytes_per_ms(), 1000.0);
        assert_eq!(settings.connections_per_origin, 1);
    }

    #[test]
    fn test_validation_failures() {
        assert!(SettingsBuilder::new().rtt_ms(-1.0).build().is_err());
        assert!(SettingsBuilder::new().throughput_bps(0.0).build().is_err());
        assert!(SettingsBuilder::new().cpu_slowdown_multiplier(f64::NAN).build().is_err());
        assert!(SettingsBuilder::new().connections_per_origin(0).build().is_err());
        assert!(SettingsBuilder::new().global_connections(0).build().is_err());
        assert!(SettingsBuilder::new().tls_round_trips(3).build().is_err());
        assert!(SettingsBuilder::new().initial_congestion_window(0.5).build().is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let result = Settings::from_file("settings.toml");
        assert!(matches!(result, Err(SettingsError::UnknownFormat(ext)) if ext == "toml"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let settings = Settings::desktop_dense_4g();
        let yaml = settings.to_yaml().unwrap();
        let restored = Settings::from_yaml(&yaml).unwrap();
        assert_eq!(settings, restored);
    }
}
