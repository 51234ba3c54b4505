//! Source record envelope
//!
//! One record per buffered OTLP batch. The partition identifies the logical
//! stream for offset bookkeeping; the offset carries the session and the
//! per-signal sequence. The physical stream partition and key stay unset -
//! the downstream platform decides those.

use serde::{Deserialize, Serialize};

use crate::ingress::SignalKind;

/// Stream identity for offset bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePartition {
    pub connector_name: String,
    pub signal_name: SignalKind,
}

/// Resume position within a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOffset {
    pub session_id: String,
    pub signal_name: SignalKind,
    pub sequence: i64,
}

/// What `poll` hands to the host per buffered OTLP batch
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub source_partition: SourcePartition,
    pub source_offset: SourceOffset,
    /// Destination stream, selected by signal
    pub topic: String,
    /// The encoded OTLP payload (JSON text or base64 protobuf)
    pub value: String,
    /// Schema of `value` in the downstream envelope; always "string" here
    pub value_type: &'static str,
    /// Ingest time of the underlying message, milliseconds since the epoch
    pub timestamp_ms: i64,
}

/// The only value schema this connector emits
pub const VALUE_TYPE_STRING: &str = "string";

impl SourceRecord {
    pub fn signal(&self) -> SignalKind {
        self.source_offset.signal_name
    }

    pub fn sequence(&self) -> i64 {
        self.source_offset.sequence
    }
}
