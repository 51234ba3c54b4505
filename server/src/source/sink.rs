//! Record sinks for the standalone host
//!
//! The driver itself never calls a sink: `poll` returns the batch and the
//! host dispatches it. The standalone binary uses [`StdoutSink`], which
//! writes one JSON line per record, as its downstream.

use std::io::Write;

use anyhow::Result;

use super::record::SourceRecord;

/// Where the standalone host delivers polled records
pub trait RecordSink {
    fn deliver(&self, record: &SourceRecord) -> Result<()>;
}

/// Writes each record as a single JSON line on stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for StdoutSink {
    fn deliver(&self, record: &SourceRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        Ok(())
    }
}
