// =============================================================================
// Application Identity
// =============================================================================

/// Application name (for display)
pub const APP_NAME: &str = "OTLP Ingress";

/// Application name in lowercase (for paths, identifiers and log filters)
pub const APP_NAME_LOWER: &str = "otlp_ingress";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "otlp-ingress.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "OTLP_INGRESS_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "OTLP_INGRESS_LOG";

// =============================================================================
// Environment Variables - Receivers
// =============================================================================

/// Environment variable for the receiver bind address
pub const ENV_BIND_ADDRESS: &str = "OTLP_INGRESS_BIND_ADDRESS";

/// Environment variable for enabling the gRPC receiver
pub const ENV_GRPC_ENABLED: &str = "OTLP_INGRESS_GRPC_ENABLED";

/// Environment variable for the gRPC receiver port
pub const ENV_GRPC_PORT: &str = "OTLP_INGRESS_GRPC_PORT";

/// Environment variable for enabling the HTTP receiver
pub const ENV_HTTP_ENABLED: &str = "OTLP_INGRESS_HTTP_ENABLED";

/// Environment variable for the HTTP receiver port
pub const ENV_HTTP_PORT: &str = "OTLP_INGRESS_HTTP_PORT";

/// Environment variable for the HTTP body limit in bytes
pub const ENV_HTTP_BODY_LIMIT: &str = "OTLP_INGRESS_HTTP_BODY_LIMIT";

/// Environment variable for enabling TLS on both receivers
pub const ENV_TLS_ENABLED: &str = "OTLP_INGRESS_TLS_ENABLED";

/// Environment variable for the TLS certificate path (PEM)
pub const ENV_TLS_CERT_PATH: &str = "OTLP_INGRESS_TLS_CERT_PATH";

/// Environment variable for the TLS private key path (PEM)
pub const ENV_TLS_KEY_PATH: &str = "OTLP_INGRESS_TLS_KEY_PATH";

// =============================================================================
// Environment Variables - Records
// =============================================================================

/// Environment variable for the payload format (json or protobuf)
pub const ENV_MESSAGE_FORMAT: &str = "OTLP_INGRESS_MESSAGE_FORMAT";

/// Environment variable for the per-signal queue capacity
pub const ENV_QUEUE_SIZE: &str = "OTLP_INGRESS_QUEUE_SIZE";

/// Environment variable for the traces destination topic
pub const ENV_TOPIC_TRACES: &str = "OTLP_INGRESS_TOPIC_TRACES";

/// Environment variable for the metrics destination topic
pub const ENV_TOPIC_METRICS: &str = "OTLP_INGRESS_TOPIC_METRICS";

/// Environment variable for the logs destination topic
pub const ENV_TOPIC_LOGS: &str = "OTLP_INGRESS_TOPIC_LOGS";

/// Environment variable for the logical connector name
pub const ENV_CONNECTOR_NAME: &str = "OTLP_INGRESS_CONNECTOR_NAME";

/// Environment variable for the data directory (offset persistence)
pub const ENV_DATA_DIR: &str = "OTLP_INGRESS_DATA_DIR";

// =============================================================================
// Receiver Defaults
// =============================================================================

/// Default listen interface for both receivers
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default OTLP gRPC port (standard OTLP/gRPC port)
pub const DEFAULT_GRPC_PORT: u16 = 4317;

/// Default OTLP HTTP port (standard OTLP/HTTP port)
pub const DEFAULT_HTTP_PORT: u16 = 4318;

/// Default maximum accepted HTTP body size (10 MiB)
pub const DEFAULT_HTTP_BODY_LIMIT: usize = 10 * 1024 * 1024;

// =============================================================================
// Destination Topics
// =============================================================================

/// Default destination topic for traces
pub const DEFAULT_TOPIC_TRACES: &str = "otlp-traces";

/// Default destination topic for metrics
pub const DEFAULT_TOPIC_METRICS: &str = "otlp-metrics";

/// Default destination topic for logs
pub const DEFAULT_TOPIC_LOGS: &str = "otlp-logs";

// =============================================================================
// Queue Fabric
// =============================================================================

/// Default per-signal queue capacity (message count)
pub const DEFAULT_QUEUE_SIZE: usize = 10_000;

/// Minimum accepted per-signal queue capacity
pub const QUEUE_SIZE_MIN: usize = 100;

/// Maximum accepted per-signal queue capacity
pub const QUEUE_SIZE_MAX: usize = 1_000_000;

// =============================================================================
// Source Driver
// =============================================================================

/// How long a poll waits for the first message of each signal (milliseconds)
pub const POLL_WAIT_MS: u64 = 100;

/// Maximum batch size per signal and poll
pub const POLL_BATCH_MAX: usize = 100;

/// Pause between empty polls in the standalone host loop (milliseconds)
pub const IDLE_POLL_PAUSE_MS: u64 = 100;

/// Interval between periodic metrics log lines (seconds)
pub const METRICS_LOG_INTERVAL_SECS: u64 = 30;

/// Queue utilization above which the metrics line is logged at warn level
pub const HIGH_QUEUE_UTILIZATION_PERCENT: f64 = 80.0;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown window per receiver before forcing termination (seconds)
pub const RECEIVER_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Overall bound for the queue drain loop during stop (milliseconds)
pub const SHUTDOWN_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Pause between drain passes during stop (milliseconds)
pub const SHUTDOWN_DRAIN_PAUSE_MS: u64 = 100;

// =============================================================================
// Offset Persistence
// =============================================================================

/// Default data directory for the standalone host
pub const DEFAULT_DATA_DIR: &str = ".otlp-ingress";

/// File name for persisted source offsets inside the data directory
pub const OFFSETS_FILE_NAME: &str = "offsets.json";
