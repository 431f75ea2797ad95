//! Service Configuration
//!
//! Layered with the `config` crate: an optional TOML file, then environment
//! variables such as `CREDIT_RISK_SERVER__BIND_ADDRESS`. Every field has a
//! default, so the service starts with neither.

use crate::rate_limit::RateLimitConfig;
use inference_engine::{ModelFormat, OutputKind};
use risk_enricher::EnricherConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tabular_input::ReaderConfig;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "CREDIT_RISK_CONFIG";

/// File read when `CREDIT_RISK_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/service.toml";

const ENV_PREFIX: &str = "CREDIT_RISK";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
    pub enrichment: EnricherConfig,
}

impl ServiceConfig {
    /// Load from the file named by `CREDIT_RISK_CONFIG`, or the default path
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from `path` (missing file is fine) with environment overrides
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            max_rows: self.server.max_rows,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Largest accepted upload, in data rows
    pub max_rows: usize,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            max_rows: ReaderConfig::default().max_rows,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// Locations of the trained model artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub schema_path: PathBuf,
    pub labels_path: PathBuf,
    pub model_path: PathBuf,
    pub model_format: ModelFormat,
    /// Importance sidecar for formats that carry none
    pub importance_path: Option<PathBuf>,
    /// What an ONNX graph's class output holds
    pub onnx_output: OutputKind,
}

impl ArtifactConfig {
    /// Artifacts under `dir` using the default file names
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            schema_path: dir.join("feature_schema.json"),
            labels_path: dir.join("label_classes.json"),
            model_path: dir.join("demo_xgb_model.json"),
            model_format: ModelFormat::XgboostJson,
            importance_path: None,
            onnx_output: OutputKind::Probabilities,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self::in_dir("models")
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings; `RUST_LOG` overrides `level`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = ServiceConfig::load_from("/nonexistent/service.toml").unwrap();
        assert_eq!(config.server.max_rows, 50_000);
        assert_eq!(config.artifacts.model_format, ModelFormat::XgboostJson);
        assert_eq!(config.artifacts.onnx_output, OutputKind::Probabilities);
        assert_eq!(config.artifacts.schema_path, PathBuf::from("models/feature_schema.json"));
        assert!(!config.rate_limit.enabled);
        assert!(config.enrichment.cosmetic_seed.is_none());
        assert_eq!(config.enrichment.credit_factors.len(), 5);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
bind_address = "127.0.0.1:9000"
max_rows = 10

[artifacts]
model_format = "onnx"
model_path = "models/risk.onnx"
importance_path = "models/importance.json"
onnx_output = "margins"

[logging]
format = "json"

[enrichment]
cosmetic_seed = 42
"#
        )
        .unwrap();

        let config = ServiceConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.reader_config().max_rows, 10);
        assert_eq!(config.artifacts.model_format, ModelFormat::Onnx);
        assert_eq!(
            config.artifacts.importance_path,
            Some(PathBuf::from("models/importance.json"))
        );
        assert_eq!(config.artifacts.onnx_output, OutputKind::Margins);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.enrichment.cosmetic_seed, Some(42));
        // untouched sections keep their defaults
        assert_eq!(config.artifacts.labels_path, PathBuf::from("models/label_classes.json"));
        assert_eq!(config.enrichment.credit_factors.len(), 5);
    }
}
