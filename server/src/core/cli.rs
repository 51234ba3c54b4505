use std::path::PathBuf;

use clap::Parser;

use crate::ingress::MessageFormat;

use super::constants::{
    ENV_BIND_ADDRESS, ENV_CONFIG, ENV_CONNECTOR_NAME, ENV_DATA_DIR, ENV_GRPC_ENABLED,
    ENV_GRPC_PORT, ENV_HTTP_BODY_LIMIT, ENV_HTTP_ENABLED, ENV_HTTP_PORT, ENV_MESSAGE_FORMAT,
    ENV_QUEUE_SIZE, ENV_TLS_CERT_PATH, ENV_TLS_ENABLED, ENV_TLS_KEY_PATH, ENV_TOPIC_LOGS,
    ENV_TOPIC_METRICS, ENV_TOPIC_TRACES,
};

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "otlp-ingress")]
#[command(version, about = "OTLP ingress bridge for streaming platforms", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Listen interface for both OTLP receivers
    #[arg(long, env = ENV_BIND_ADDRESS)]
    pub bind_address: Option<String>,

    /// Enable the OTLP gRPC receiver
    #[arg(long, env = ENV_GRPC_ENABLED)]
    pub grpc_enabled: Option<bool>,

    /// OTLP gRPC port
    #[arg(long, env = ENV_GRPC_PORT)]
    pub grpc_port: Option<u16>,

    /// Enable the OTLP HTTP receiver
    #[arg(long, env = ENV_HTTP_ENABLED)]
    pub http_enabled: Option<bool>,

    /// OTLP HTTP port
    #[arg(long, env = ENV_HTTP_PORT)]
    pub http_port: Option<u16>,

    /// Maximum accepted HTTP body size in bytes
    #[arg(long, env = ENV_HTTP_BODY_LIMIT)]
    pub http_body_limit: Option<usize>,

    /// Enable TLS on both receivers
    #[arg(long, env = ENV_TLS_ENABLED)]
    pub tls_enabled: Option<bool>,

    /// Path to TLS certificate file (PEM)
    #[arg(long, env = ENV_TLS_CERT_PATH)]
    pub tls_cert_path: Option<PathBuf>,

    /// Path to TLS private key file (PEM)
    #[arg(long, env = ENV_TLS_KEY_PATH)]
    pub tls_key_path: Option<PathBuf>,

    /// Payload format for produced records (json or protobuf)
    #[arg(long, env = ENV_MESSAGE_FORMAT, value_parser = parse_message_format)]
    pub message_format: Option<MessageFormat>,

    /// Per-signal message queue capacity
    #[arg(long, env = ENV_QUEUE_SIZE)]
    pub queue_size: Option<usize>,

    /// Destination topic for traces
    #[arg(long, env = ENV_TOPIC_TRACES)]
    pub topic_traces: Option<String>,

    /// Destination topic for metrics
    #[arg(long, env = ENV_TOPIC_METRICS)]
    pub topic_metrics: Option<String>,

    /// Destination topic for logs
    #[arg(long, env = ENV_TOPIC_LOGS)]
    pub topic_logs: Option<String>,

    /// Logical connector name used in offsets and metrics
    #[arg(long, env = ENV_CONNECTOR_NAME)]
    pub connector_name: Option<String>,

    /// Directory for offset persistence
    #[arg(long, env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,
}

pub type CliConfig = Cli;

pub fn parse() -> CliConfig {
    Cli::parse()
}

fn parse_message_format(s: &str) -> Result<MessageFormat, String> {
    match s.to_lowercase().as_str() {
        "json" => Ok(MessageFormat::Json),
        "protobuf" => Ok(MessageFormat::Protobuf),
        _ => Err(format!("must be 'json' or 'protobuf', got: {s}")),
    }
}
