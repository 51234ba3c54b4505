//! Payload codec
//!
//! Converts a decoded OTLP export request into the text payload carried in
//! produced records: either the OTLP/JSON mapping or base64 of the protobuf
//! wire form. The format is fixed when the ingress starts and never varies
//! within a run.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output format for produced record payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Json,
    Protobuf,
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFormat::Json => write!(f, "json"),
            MessageFormat::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// Error returned when a request cannot be rendered in the configured format.
///
/// The request is rejected at the protocol layer and never enqueued.
#[derive(Debug, Error)]
#[error("failed to encode OTLP payload: {0}")]
pub struct EncodeError(String);

/// Stateless converter from OTLP request to record payload
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    format: MessageFormat,
}

impl PayloadCodec {
    pub fn new(format: MessageFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    /// Render an export request in the configured format.
    ///
    /// JSON mode uses the OTLP/JSON serde mapping of the generated types;
    /// protobuf mode emits standard-alphabet padded base64 of the wire bytes.
    pub fn encode<T>(&self, request: &T) -> Result<String, EncodeError>
    where
        T: Message + Serialize,
    {
        match self.format {
            MessageFormat::Json => {
                serde_json::to_string(request).map_err(|e| EncodeError(e.to_string()))
            }
            MessageFormat::Protobuf => Ok(BASE64.encode(request.encode_to_vec())),
        }
    }
}
