//! Configuration management for the ensemble prediction service

use crate::models::aggregator::AggregationMethod;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Environment variable that overrides the default configuration path
pub const CONFIG_PATH_ENV: &str = "EXO_CONFIG";

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Candidate columns used when a model does not declare its own features.
/// NASA exoplanet archive naming (Kepler/TESS style tables).
pub const ARCHIVE_CANDIDATES: &[&str] = &[
    "st_teff",
    "st_logg",
    "st_rad",
    "st_dist",
    "pl_orbper",
    "pl_trandurh",
    "pl_trandep",
    "pl_rade",
    "pl_insol",
    "pl_eqt",
    "Rp_Rs",
];

/// Generic transit-signal synonyms.
pub const TRANSIT_CANDIDATES: &[&str] = &[
    "depth_ppm",
    "transit_depth",
    "snr",
    "planet_radius",
    "orbital_period",
    "duration_hours",
    "duration",
    "period",
];

/// Shape of the JSON returned by the prediction endpoint
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// Summary carries method and per-model features, rows carry per-model probabilities
    #[default]
    Multi,
    /// Exactly one model; summary and rows omit the ensemble fields
    Single,
}

/// Which built-in fallback column list applies
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CandidateProfile {
    #[default]
    Archive,
    Transit,
}

impl CandidateProfile {
    pub fn columns(&self) -> Vec<String> {
        let names = match self {
            CandidateProfile::Archive => ARCHIVE_CANDIDATES,
            CandidateProfile::Transit => TRANSIT_CANDIDATES,
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

/// Forced capability for a model entry
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityHint {
    Probabilistic,
    Scoring,
    Deciding,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Allowed CORS origins; "*" allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub response_shape: ResponseShape,
}

fn default_max_upload_size() -> usize {
    10 * 1024 * 1024
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "*".to_string(),
    ]
}

/// Model artifacts configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Models in load order; slot `m1` is the first entry
    pub entries: Vec<ModelEntry>,
}

fn default_onnx_threads() -> usize {
    1
}

/// A single model artifact
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub path: String,
    /// Column names the model was trained on, in training order
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Skip output inspection and use this capability
    #[serde(default)]
    pub capability: Option<CapabilityHint>,
}

/// Request defaults and feature fallback
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub method: AggregationMethod,
    #[serde(default)]
    pub candidate_profile: CandidateProfile,
    /// Replaces the profile's column list when set
    #[serde(default)]
    pub candidate_features: Option<Vec<String>>,
}

fn default_threshold() -> f64 {
    0.5
}

impl PredictionConfig {
    /// Fallback columns in priority order
    pub fn candidates(&self) -> Vec<String> {
        match &self.candidate_features {
            Some(features) if !features.is_empty() => features.clone(),
            _ => self.candidate_profile.columns(),
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            method: AggregationMethod::default(),
            candidate_profile: CandidateProfile::default(),
            candidate_features: None,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries, 0 disables
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `EXO_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject configurations the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.models.entries.is_empty() {
            anyhow::bail!("No models configured; add at least one [[models.entries]]");
        }
        if self.server.response_shape == ResponseShape::Single && self.models.entries.len() != 1 {
            anyhow::bail!(
                "response_shape = \"single\" requires exactly one model, found {}",
                self.models.entries.len()
            );
        }
        if !self.prediction.threshold.is_finite() {
            anyhow::bail!("prediction.threshold must be a finite number");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_upload_size: default_max_upload_size(),
                cors_origins: default_cors_origins(),
                response_shape: ResponseShape::Multi,
            },
            models: ModelsConfig {
                onnx_threads: 1,
                entries: vec![
                    ModelEntry {
                        name: "kepler".to_string(),
                        path: "models/random_forest_kepler_model.onnx".to_string(),
                        feature_names: None,
                        capability: None,
                    },
                    ModelEntry {
                        name: "tess".to_string(),
                        path: "models/tess_random_forest_model.onnx".to_string(),
                        feature_names: None,
                        capability: None,
                    },
                ],
            },
            prediction: PredictionConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.prediction.threshold, 0.5);
        assert_eq!(config.prediction.method, AggregationMethod::Borda);
        assert_eq!(config.models.entries.len(), 2);
        assert_eq!(config.server.response_shape, ResponseShape::Multi);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_candidate_override() {
        let mut prediction = PredictionConfig::default();
        assert_eq!(prediction.candidates()[0], "st_teff");

        prediction.candidate_profile = CandidateProfile::Transit;
        assert_eq!(prediction.candidates()[0], "depth_ppm");

        prediction.candidate_features = Some(vec!["flux".to_string()]);
        assert_eq!(prediction.candidates(), vec!["flux".to_string()]);
    }

    #[test]
    fn test_single_shape_requires_one_model() {
        let mut config = AppConfig::default();
        config.server.response_shape = ResponseShape::Single;
        assert!(config.validate().is_err());

        config.models.entries.truncate(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = std::env::temp_dir().join(format!("exo-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[models]
[[models.entries]]
name = "kepler"
path = "models/kepler.onnx"
feature_names = ["pl_rade", "pl_orbper"]
capability = "scoring"

[prediction]
threshold = 0.6
method = "vote"
candidate_profile = "transit"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.cors_origins.len(), 3);
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.models.entries[0].capability, Some(CapabilityHint::Scoring));
        assert_eq!(config.prediction.method, AggregationMethod::Vote);
        assert_eq!(config.prediction.candidate_profile, CandidateProfile::Transit);
        assert_eq!(config.logging.level, "info");

        std::fs::remove_dir_all(&dir).ok();
    }
}
