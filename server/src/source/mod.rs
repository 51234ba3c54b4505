//! Streaming-platform source driver
//!
//! The integration boundary toward the host framework: `poll` drains the
//! signal queues into source records stamped with per-signal sequences,
//! `commit` tracks what the host reports as delivered, and the offset reader
//! lets a restarted instance resume where the previous one left off.

pub mod driver;
pub mod offsets;
pub mod record;
pub mod sink;

pub use driver::{Committer, SourceDriver};
pub use offsets::{FileOffsetStore, NoOffsets, OffsetReader, OffsetTracker, PersistedOffset};
pub use record::{SourceOffset, SourcePartition, SourceRecord};
pub use sink::{RecordSink, StdoutSink};
