//! OTLP reception layer
//!
//! Terminates OTLP/gRPC and OTLP/HTTP traffic, converts each export request
//! into a text payload and buffers it in one bounded queue per signal. The
//! source driver drains those queues on the other side.

pub mod codec;
pub mod grpc;
pub mod http;
pub mod metrics;
pub mod queue;
pub mod receiver;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use codec::{EncodeError, MessageFormat, PayloadCodec};
pub use metrics::IngressMetrics;
pub use queue::{QueueConsumers, QueueSet, SignalQueue, SignalQueueConsumer};
pub use receiver::{OtlpReceiver, SignalPipeline};

/// The three OTLP telemetry kinds.
///
/// The uppercase names are part of the external contract: they appear
/// verbatim in offset records and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Traces,
    Metrics,
    Logs,
}

impl SignalKind {
    /// All signals in the fixed order the driver polls them
    pub const ALL: [SignalKind; 3] = [SignalKind::Traces, SignalKind::Metrics, SignalKind::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Traces => "TRACES",
            SignalKind::Metrics => "METRICS",
            SignalKind::Logs => "LOGS",
        }
    }

    /// Stable index for per-signal counter arrays
    pub(crate) fn index(&self) -> usize {
        match self {
            SignalKind::Traces => 0,
            SignalKind::Metrics => 1,
            SignalKind::Logs => 2,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit handed from receiver to queue to source record.
///
/// Created inside a receiver handler, owned by the queue while buffered,
/// then owned by the record until the host's sink accepts it.
#[derive(Debug, Clone)]
pub struct OtlpMessage {
    pub signal: SignalKind,
    pub payload: String,
    /// Ingest wall-clock time in milliseconds since the epoch
    pub ingest_time_ms: i64,
}

impl OtlpMessage {
    pub fn new(signal: SignalKind, payload: String) -> Self {
        Self {
            signal,
            payload,
            ingest_time_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}
