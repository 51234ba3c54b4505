//! OTLP ingress bridge
//!
//! Terminates OTLP/gRPC and OTLP/HTTP telemetry traffic, buffers each batch
//! in bounded per-signal queues and hands it to a streaming-platform source
//! driver as sequenced records with restart-safe offsets.

pub mod app;
pub mod core;
pub mod ingress;
pub mod source;
