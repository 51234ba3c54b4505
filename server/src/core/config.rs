//! Configuration loading and validation
//!
//! Priority (lowest to highest): defaults, JSON config file (CLI-specified
//! path or `otlp-ingress.json` in the working directory), CLI arguments
//! (which include env var fallbacks via clap).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ingress::MessageFormat;

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_BIND_ADDRESS, DEFAULT_GRPC_PORT, DEFAULT_HTTP_BODY_LIMIT,
    DEFAULT_HTTP_PORT, DEFAULT_QUEUE_SIZE, DEFAULT_TOPIC_LOGS, DEFAULT_TOPIC_METRICS,
    DEFAULT_TOPIC_TRACES, QUEUE_SIZE_MAX, QUEUE_SIZE_MIN,
};
use crate::ingress::SignalKind;

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// gRPC receiver section (nested under otlp)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GrpcFileConfig {
    pub enabled: Option<bool>,
    pub port: Option<u16>,
}

/// HTTP receiver section (nested under otlp)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HttpFileConfig {
    pub enabled: Option<bool>,
    pub port: Option<u16>,
    pub body_limit_bytes: Option<usize>,
}

/// TLS section (nested under otlp)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TlsFileConfig {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Record payload section (nested under otlp)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MessageFileConfig {
    pub format: Option<MessageFormat>,
    pub queue_size: Option<usize>,
}

/// OTLP receiver configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct OtlpFileConfig {
    pub bind_address: Option<String>,
    pub grpc: Option<GrpcFileConfig>,
    pub http: Option<HttpFileConfig>,
    pub tls: Option<TlsFileConfig>,
    pub message: Option<MessageFileConfig>,
}

/// Destination topics section (nested under kafka)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct KafkaTopicFileConfig {
    pub traces: Option<String>,
    pub metrics: Option<String>,
    pub logs: Option<String>,
}

/// Kafka configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct KafkaFileConfig {
    pub topic: Option<KafkaTopicFileConfig>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub otlp: Option<OtlpFileConfig>,
    pub kafka: Option<KafkaFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// gRPC receiver configuration
#[derive(Debug, Clone)]
pub struct GrpcConfig {
    pub enabled: bool,
    pub port: u16,
}

/// HTTP receiver configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub port: u16,
    /// Maximum accepted request body size in bytes
    pub body_limit_bytes: usize,
}

/// TLS configuration. Declared surface only: enabling it is rejected at
/// validation until termination is actually wired into the receivers.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// Destination topics, one per signal
#[derive(Debug, Clone)]
pub struct TopicsConfig {
    pub traces: String,
    pub metrics: String,
    pub logs: String,
}

impl TopicsConfig {
    pub fn for_signal(&self, signal: SignalKind) -> &str {
        match signal {
            SignalKind::Traces => &self.traces,
            SignalKind::Metrics => &self.metrics,
            SignalKind::Logs => &self.logs,
        }
    }
}

/// Final merged ingress configuration
#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub bind_address: String,
    pub grpc: GrpcConfig,
    pub http: HttpConfig,
    pub tls: TlsConfig,
    pub topics: TopicsConfig,
    pub message_format: MessageFormat,
    /// Per-signal queue capacity
    pub queue_size: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            grpc: GrpcConfig {
                enabled: true,
                port: DEFAULT_GRPC_PORT,
            },
            http: HttpConfig {
                enabled: true,
                port: DEFAULT_HTTP_PORT,
                body_limit_bytes: DEFAULT_HTTP_BODY_LIMIT,
            },
            tls: TlsConfig::default(),
            topics: TopicsConfig {
                traces: DEFAULT_TOPIC_TRACES.to_string(),
                metrics: DEFAULT_TOPIC_METRICS.to_string(),
                logs: DEFAULT_TOPIC_LOGS.to_string(),
            },
            message_format: MessageFormat::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl IngressConfig {
    /// Load configuration from all sources and validate it
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let mut file_config = FileConfig::default();

        let config_path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            local.exists().then_some(local)
        };

        if let Some(path) = config_path {
            file_config = FileConfig::load_from_file(&path)?;
            file_config.warn_unknown_fields();
            tracing::debug!(path = %path.display(), "Config file loaded");
        }

        let file_otlp = file_config.otlp.unwrap_or_default();
        let file_grpc = file_otlp.grpc.unwrap_or_default();
        let file_http = file_otlp.http.unwrap_or_default();
        let file_tls = file_otlp.tls.unwrap_or_default();
        let file_message = file_otlp.message.unwrap_or_default();
        let file_topics = file_config
            .kafka
            .unwrap_or_default()
            .topic
            .unwrap_or_default();

        let config = Self {
            bind_address: cli
                .bind_address
                .clone()
                .or(file_otlp.bind_address)
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            grpc: GrpcConfig {
                enabled: cli.grpc_enabled.or(file_grpc.enabled).unwrap_or(true),
                port: cli.grpc_port.or(file_grpc.port).unwrap_or(DEFAULT_GRPC_PORT),
            },
            http: HttpConfig {
                enabled: cli.http_enabled.or(file_http.enabled).unwrap_or(true),
                port: cli.http_port.or(file_http.port).unwrap_or(DEFAULT_HTTP_PORT),
                body_limit_bytes: cli
                    .http_body_limit
                    .or(file_http.body_limit_bytes)
                    .unwrap_or(DEFAULT_HTTP_BODY_LIMIT),
            },
            tls: TlsConfig {
                enabled: cli.tls_enabled.or(file_tls.enabled).unwrap_or(false),
                cert_path: cli
                    .tls_cert_path
                    .clone()
                    .or(file_tls.cert_path.map(PathBuf::from)),
                key_path: cli
                    .tls_key_path
                    .clone()
                    .or(file_tls.key_path.map(PathBuf::from)),
            },
            topics: TopicsConfig {
                traces: cli
                    .topic_traces
                    .clone()
                    .or(file_topics.traces)
                    .unwrap_or_else(|| DEFAULT_TOPIC_TRACES.to_string()),
                metrics: cli
                    .topic_metrics
                    .clone()
                    .or(file_topics.metrics)
                    .unwrap_or_else(|| DEFAULT_TOPIC_METRICS.to_string()),
                logs: cli
                    .topic_logs
                    .clone()
                    .or(file_topics.logs)
                    .unwrap_or_else(|| DEFAULT_TOPIC_LOGS.to_string()),
            },
            message_format: cli
                .message_format
                .or(file_message.format)
                .unwrap_or_default(),
            queue_size: cli
                .queue_size
                .or(file_message.queue_size)
                .unwrap_or(DEFAULT_QUEUE_SIZE),
        };

        config.validate()?;

        tracing::debug!(
            bind_address = %config.bind_address,
            grpc_enabled = config.grpc.enabled,
            grpc_port = config.grpc.port,
            http_enabled = config.http.enabled,
            http_port = config.http.port,
            http_body_limit = config.http.body_limit_bytes,
            tls_enabled = config.tls.enabled,
            message_format = %config.message_format,
            queue_size = config.queue_size,
            topic_traces = %config.topics.traces,
            topic_metrics = %config.topics.metrics,
            topic_logs = %config.topics.logs,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.is_empty() {
            anyhow::bail!("Configuration error: otlp.bind.address must not be empty");
        }

        if !self.grpc.enabled && !self.http.enabled {
            anyhow::bail!(
                "Configuration error: at least one of otlp.grpc.enabled and otlp.http.enabled must be true"
            );
        }

        if self.grpc.enabled && self.grpc.port == 0 {
            anyhow::bail!("Configuration error: otlp.grpc.port must be in [1, 65535]");
        }
        if self.http.enabled && self.http.port == 0 {
            anyhow::bail!("Configuration error: otlp.http.port must be in [1, 65535]");
        }
        if self.grpc.enabled && self.http.enabled && self.grpc.port == self.http.port {
            anyhow::bail!(
                "Configuration error: otlp.grpc.port ({}) and otlp.http.port ({}) cannot be the same",
                self.grpc.port,
                self.http.port
            );
        }

        if self.queue_size < QUEUE_SIZE_MIN || self.queue_size > QUEUE_SIZE_MAX {
            anyhow::bail!(
                "Configuration error: otlp.message.queue.size must be in [{}, {}], got {}",
                QUEUE_SIZE_MIN,
                QUEUE_SIZE_MAX,
                self.queue_size
            );
        }

        if self.http.enabled && self.http.body_limit_bytes == 0 {
            anyhow::bail!("Configuration error: otlp.http.body.limit.bytes must be greater than 0");
        }

        for signal in SignalKind::ALL {
            if self.topics.for_signal(signal).is_empty() {
                anyhow::bail!(
                    "Configuration error: destination topic for {} must not be empty",
                    signal
                );
            }
        }

        if self.tls.enabled {
            let cert = self
                .tls
                .cert_path
                .as_ref()
                .context("Configuration error: otlp.tls.cert.path is required when otlp.tls.enabled is true")?;
            let key = self
                .tls
                .key_path
                .as_ref()
                .context("Configuration error: otlp.tls.key.path is required when otlp.tls.enabled is true")?;
            if !cert.is_file() {
                anyhow::bail!(
                    "Configuration error: otlp.tls.cert.path does not exist: {}",
                    cert.display()
                );
            }
            if !key.is_file() {
                anyhow::bail!(
                    "Configuration error: otlp.tls.key.path does not exist: {}",
                    key.display()
                );
            }
            anyhow::bail!(
                "Configuration error: TLS termination is not implemented yet; set otlp.tls.enabled to false"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngressConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grpc.port, 4317);
        assert_eq!(config.http.port, 4318);
        assert_eq!(config.queue_size, 10_000);
        assert_eq!(config.http.body_limit_bytes, 10 * 1024 * 1024);
        assert_eq!(config.topics.traces, "otlp-traces");
    }

    #[test]
    fn test_both_receivers_disabled_rejected() {
        let mut config = IngressConfig::default();
        config.grpc.enabled = false;
        config.http.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_receiver_is_enough() {
        let mut config = IngressConfig::default();
        config.grpc.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = IngressConfig::default();
        config.grpc.port = 0;
        assert!(config.validate().is_err());

        // A disabled receiver's port is not checked
        config.grpc.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut config = IngressConfig::default();
        config.http.port = config.grpc.port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_size_bounds() {
        let mut config = IngressConfig::default();
        config.queue_size = 99;
        assert!(config.validate().is_err());
        config.queue_size = 100;
        assert!(config.validate().is_ok());
        config.queue_size = 1_000_000;
        assert!(config.validate().is_ok());
        config.queue_size = 1_000_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tls_requires_cert_and_key() {
        let mut config = IngressConfig::default();
        config.tls.enabled = true;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("otlp.tls.cert.path"));
    }

    #[test]
    fn test_tls_enabled_is_rejected_even_with_material() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "cert").unwrap();
        std::fs::write(&key, "key").unwrap();

        let mut config = IngressConfig::default();
        config.tls.enabled = true;
        config.tls.cert_path = Some(cert);
        config.tls.key_path = Some(key);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("not implemented"));
    }

    #[test]
    fn test_tls_material_without_enabled_is_ignored() {
        let mut config = IngressConfig::default();
        config.tls.cert_path = Some(PathBuf::from("/nonexistent/cert.pem"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_config_parses_nested_sections() {
        let json = r#"{
            "otlp": {
                "bind_address": "127.0.0.1",
                "grpc": {"enabled": false, "port": 14317},
                "http": {"port": 14318},
                "message": {"format": "protobuf", "queue_size": 500}
            },
            "kafka": {"topic": {"traces": "telemetry-traces"}}
        }"#;
        let file: FileConfig = serde_json::from_str(json).unwrap();
        let otlp = file.otlp.unwrap();
        assert_eq!(otlp.bind_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(otlp.grpc.unwrap().enabled, Some(false));
        assert_eq!(
            otlp.message.unwrap().format,
            Some(MessageFormat::Protobuf)
        );
        assert_eq!(
            file.kafka.unwrap().topic.unwrap().traces.as_deref(),
            Some("telemetry-traces")
        );
    }
}
