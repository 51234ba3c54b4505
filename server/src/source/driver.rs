//! Source driver: poll/commit lifecycle
//!
//! One driver instance per configured connector. `start` restores persisted
//! sequences and brings up the receivers, `poll` drains bounded batches from
//! the signal queues into source records, `commit` (through a [`Committer`])
//! tracks delivered sequences, and `stop` runs the ordered drain state
//! machine: receivers first, then the queues, all under hard time bounds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::core::config::IngressConfig;
use crate::core::constants::{
    HIGH_QUEUE_UTILIZATION_PERCENT, METRICS_LOG_INTERVAL_SECS, POLL_BATCH_MAX, POLL_WAIT_MS,
    SHUTDOWN_DRAIN_PAUSE_MS, SHUTDOWN_DRAIN_TIMEOUT_MS,
};
use crate::ingress::queue::{QueueConsumers, QueueSet};
use crate::ingress::{IngressMetrics, OtlpMessage, OtlpReceiver, SignalKind, metrics};

use super::offsets::{OffsetReader, OffsetTracker};
use super::record::{SourceOffset, SourcePartition, SourceRecord, VALUE_TYPE_STRING};

pub struct SourceDriver {
    config: IngressConfig,
    connector_name: String,
    session_id: String,
    stopping: AtomicBool,
    offsets: Arc<OffsetTracker>,
    metrics: Arc<IngressMetrics>,
    receiver: Option<OtlpReceiver>,
    consumers: Option<QueueConsumers>,
    last_metrics_log: Instant,
}

impl SourceDriver {
    pub fn new(config: IngressConfig, connector_name: impl Into<String>) -> Self {
        let connector_name = connector_name.into();
        Self {
            config,
            metrics: Arc::new(IngressMetrics::new(connector_name.clone())),
            connector_name,
            session_id: String::new(),
            stopping: AtomicBool::new(false),
            offsets: Arc::new(OffsetTracker::new()),
            receiver: None,
            consumers: None,
            last_metrics_log: Instant::now(),
        }
    }

    /// Session identity of the current run, fixed at start
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    pub fn metrics(&self) -> &Arc<IngressMetrics> {
        &self.metrics
    }

    /// Queue producer handles, available while started
    pub fn queues(&self) -> Option<&QueueSet> {
        self.receiver.as_ref().map(|r| r.queues())
    }

    /// Actual gRPC listen address while started
    pub fn grpc_addr(&self) -> Option<std::net::SocketAddr> {
        self.receiver.as_ref().and_then(|r| r.grpc_addr())
    }

    /// Actual HTTP listen address while started
    pub fn http_addr(&self) -> Option<std::net::SocketAddr> {
        self.receiver.as_ref().and_then(|r| r.http_addr())
    }

    /// Last committed sequence for a signal (-1 before the first commit)
    pub fn committed(&self, signal: SignalKind) -> i64 {
        self.offsets.committed(signal)
    }

    /// Start the driver: validate config, mint a session, restore persisted
    /// offsets and bring up the receivers. Bind failures abort the start and
    /// release everything acquired so far.
    pub async fn start(&mut self, offset_reader: &dyn OffsetReader) -> Result<()> {
        if self.receiver.is_some() {
            return Ok(());
        }

        self.config.validate()?;

        self.session_id = Uuid::new_v4().to_string();
        tracing::info!(
            connector_name = %self.connector_name,
            session_id = %self.session_id,
            grpc_port = self.config.grpc.port,
            http_port = self.config.http.port,
            topics = format!(
                "{},{},{}",
                self.config.topics.traces, self.config.topics.metrics, self.config.topics.logs
            ),
            "source driver starting"
        );

        // Metrics are a secondary concern: registration replaces any prior
        // same-named instance and never blocks startup.
        metrics::register(Arc::clone(&self.metrics));
        self.metrics.set_queue_capacity(self.config.queue_size as u64);

        self.restore_offsets(offset_reader);

        let (mut receiver, consumers) =
            OtlpReceiver::new(self.config.clone(), Arc::clone(&self.metrics));
        if let Err(e) = receiver.start().await {
            metrics::unregister(&self.connector_name);
            return Err(e).context("failed to start OTLP receiver");
        }

        self.receiver = Some(receiver);
        self.consumers = Some(consumers);

        tracing::info!(
            session_id = %self.session_id,
            traces_seq = self.offsets.current_sequence(SignalKind::Traces),
            metrics_seq = self.offsets.current_sequence(SignalKind::Metrics),
            logs_seq = self.offsets.current_sequence(SignalKind::Logs),
            "source driver started"
        );
        Ok(())
    }

    fn restore_offsets(&self, offset_reader: &dyn OffsetReader) {
        for signal in SignalKind::ALL {
            let partition = SourcePartition {
                connector_name: self.connector_name.clone(),
                signal_name: signal,
            };
            // Absent record and record without a sequence both mean a fresh start
            let persisted = offset_reader.offset(&partition);
            let Some(sequence) = persisted.as_ref().and_then(|p| p.sequence) else {
                tracing::info!(
                    signal = %signal,
                    "no previous offset found, starting from sequence 0"
                );
                continue;
            };

            self.offsets.restore(signal, sequence);
            let previous_session = persisted
                .as_ref()
                .and_then(|p| p.session_id.as_deref())
                .unwrap_or("unknown");
            tracing::info!(
                signal = %signal,
                sequence,
                previous_session = %previous_session,
                "restored offset state"
            );
            if previous_session != self.session_id {
                tracing::warn!(
                    signal = %signal,
                    previous_session = %previous_session,
                    session_id = %self.session_id,
                    "session changed since last committed offset, resuming after restart"
                );
            }
        }
    }

    /// Drain bounded batches from all three queues into source records.
    ///
    /// Returns `None` while stopping or when nothing was drained; the host is
    /// expected to call back after a short delay. Blocks at most ~100 ms per
    /// signal waiting for the first message.
    pub async fn poll(&mut self) -> Option<Vec<SourceRecord>> {
        if self.stopping.load(Ordering::SeqCst) {
            return None;
        }

        let mut drained = Vec::new();
        {
            let consumers = self.consumers.as_mut()?;
            for signal in SignalKind::ALL {
                let consumer = consumers.get_mut(signal);
                let Some(first) = consumer.poll(Duration::from_millis(POLL_WAIT_MS)).await else {
                    continue;
                };
                drained.push(first);
                drained.extend(consumer.drain_up_to(POLL_BATCH_MAX - 1));
            }
        }
        let records: Vec<SourceRecord> = drained
            .into_iter()
            .map(|message| self.build_record(message))
            .collect();

        if let Some(receiver) = &self.receiver {
            for signal in SignalKind::ALL {
                self.metrics
                    .update_queue_size(signal, receiver.queues().get(signal).size() as u64);
            }
        }

        if records.is_empty() {
            return None;
        }

        self.metrics.increment_records_produced(records.len() as u64);

        if self.last_metrics_log.elapsed() >= Duration::from_secs(METRICS_LOG_INTERVAL_SECS) {
            self.log_metrics();
            self.last_metrics_log = Instant::now();
        }

        Some(records)
    }

    fn build_record(&self, message: OtlpMessage) -> SourceRecord {
        let signal = message.signal;
        let sequence = self.offsets.next_sequence(signal);
        SourceRecord {
            source_partition: SourcePartition {
                connector_name: self.connector_name.clone(),
                signal_name: signal,
            },
            source_offset: SourceOffset {
                session_id: self.session_id.clone(),
                signal_name: signal,
                sequence,
            },
            topic: self.config.topics.for_signal(signal).to_string(),
            value: message.payload,
            value_type: VALUE_TYPE_STRING,
            timestamp_ms: message.ingest_time_ms,
        }
    }

    /// Commit handle for the host framework; callable from any thread,
    /// concurrently with `poll`.
    pub fn committer(&self) -> Committer {
        Committer {
            offsets: Arc::clone(&self.offsets),
        }
    }

    /// Ordered shutdown: short-circuit `poll`, stop both receivers with
    /// bounded grace, discard whatever is still buffered, then emit the final
    /// metrics line and drop the metrics registration. Records already handed
    /// to the host are not waited on.
    pub async fn stop(&mut self) {
        tracing::info!(session_id = %self.session_id, "source driver stopping");
        self.stopping.store(true, Ordering::SeqCst);

        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop().await;
        }

        if let Some(mut consumers) = self.consumers.take() {
            let deadline = Instant::now() + Duration::from_millis(SHUTDOWN_DRAIN_TIMEOUT_MS);
            let mut discarded = 0usize;
            loop {
                let mut drained = 0usize;
                for signal in SignalKind::ALL {
                    drained += consumers.get_mut(signal).drain_up_to(usize::MAX).len();
                }
                if drained == 0 {
                    break;
                }
                discarded += drained;
                tracing::debug!(count = drained, "drained buffered messages");
                if Instant::now() >= deadline {
                    tracing::warn!(discarded, "queue drain deadline reached");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(SHUTDOWN_DRAIN_PAUSE_MS)).await;
            }
            tracing::info!(discarded, "queue drain completed");
        }

        self.log_metrics();
        metrics::unregister(&self.connector_name);

        tracing::info!(
            session_id = %self.session_id,
            final_traces_seq = self.offsets.current_sequence(SignalKind::Traces),
            final_metrics_seq = self.offsets.current_sequence(SignalKind::Metrics),
            final_logs_seq = self.offsets.current_sequence(SignalKind::Logs),
            "source driver stopped"
        );
    }

    fn log_metrics(&self) {
        let snapshot = self.metrics.snapshot();
        if snapshot.max_queue_utilization_percent > HIGH_QUEUE_UTILIZATION_PERCENT {
            tracing::warn!(
                session_id = %self.session_id,
                records_produced = snapshot.records_produced,
                total_received = snapshot.total_received,
                total_dropped = snapshot.total_dropped,
                traces_queue_size = snapshot.traces_queue_size,
                metrics_queue_size = snapshot.metrics_queue_size,
                logs_queue_size = snapshot.logs_queue_size,
                queue_capacity = snapshot.queue_capacity,
                max_queue_utilization_percent = snapshot.max_queue_utilization_percent,
                total_lag = snapshot.total_lag,
                drop_rate = snapshot.drop_rate,
                status = "HIGH_QUEUE_UTILIZATION",
                "ingress metrics"
            );
        } else {
            tracing::info!(
                session_id = %self.session_id,
                records_produced = snapshot.records_produced,
                total_received = snapshot.total_received,
                total_dropped = snapshot.total_dropped,
                traces_queue_size = snapshot.traces_queue_size,
                metrics_queue_size = snapshot.metrics_queue_size,
                logs_queue_size = snapshot.logs_queue_size,
                queue_capacity = snapshot.queue_capacity,
                max_queue_utilization_percent = snapshot.max_queue_utilization_percent,
                total_lag = snapshot.total_lag,
                drop_rate = snapshot.drop_rate,
                status = "HEALTHY",
                "ingress metrics"
            );
        }
    }
}

/// Best-effort commit hook. Faults in commit accounting never interrupt the
/// commit stream, and commits never regress the committed mark.
#[derive(Clone)]
pub struct Committer {
    offsets: Arc<OffsetTracker>,
}

impl Committer {
    pub fn commit(&self, record: &SourceRecord) {
        self.offsets
            .commit(record.source_offset.signal_name, record.source_offset.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::offsets::{NoOffsets, PersistedOffset};

    /// Pick two distinct ports the OS currently considers free. Both
    /// listeners are held while reading the addresses so the ports differ.
    fn free_ports() -> (u16, u16) {
        let a = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let b = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        (
            a.local_addr().unwrap().port(),
            b.local_addr().unwrap().port(),
        )
    }

    fn test_config() -> IngressConfig {
        let mut config = IngressConfig::default();
        config.bind_address = "127.0.0.1".to_string();
        (config.grpc.port, config.http.port) = free_ports();
        config
    }

    struct StubReader {
        traces: PersistedOffset,
    }

    impl OffsetReader for StubReader {
        fn offset(&self, partition: &SourcePartition) -> Option<PersistedOffset> {
            (partition.signal_name == SignalKind::Traces).then(|| self.traces.clone())
        }
    }

    fn message(signal: SignalKind, payload: &str) -> OtlpMessage {
        OtlpMessage::new(signal, payload.to_string())
    }

    #[tokio::test]
    async fn test_poll_emits_sequenced_records_in_signal_order() {
        let mut driver = SourceDriver::new(test_config(), "seq-test");
        driver.start(&NoOffsets).await.unwrap();

        let queues = driver.queues().unwrap().clone();
        for i in 0..3 {
            queues
                .get(SignalKind::Traces)
                .offer(message(SignalKind::Traces, &format!("t{i}")));
        }
        queues
            .get(SignalKind::Logs)
            .offer(message(SignalKind::Logs, "l0"));

        let records = driver.poll().await.unwrap();
        assert_eq!(records.len(), 4);

        // Fixed signal order: traces batch first, then logs
        assert_eq!(records[0].topic, "otlp-traces");
        assert_eq!(records[0].sequence(), 1);
        assert_eq!(records[1].sequence(), 2);
        assert_eq!(records[2].sequence(), 3);
        assert_eq!(records[3].topic, "otlp-logs");
        assert_eq!(records[3].sequence(), 1);
        assert_eq!(records[0].value, "t0");
        assert_eq!(driver.metrics().records_produced(), 4);

        driver.stop().await;
    }

    #[tokio::test]
    async fn test_poll_returns_none_when_queues_empty() {
        let mut driver = SourceDriver::new(test_config(), "empty-test");
        driver.start(&NoOffsets).await.unwrap();
        assert!(driver.poll().await.is_none());
        driver.stop().await;
    }

    #[tokio::test]
    async fn test_resume_continues_sequence_with_new_session() {
        let mut driver = SourceDriver::new(test_config(), "resume-test");
        driver
            .start(&StubReader {
                traces: PersistedOffset {
                    session_id: Some("previous-session".to_string()),
                    sequence: Some(42),
                },
            })
            .await
            .unwrap();

        assert_ne!(driver.session_id(), "previous-session");
        assert_eq!(driver.committed(SignalKind::Traces), 42);

        driver
            .queues()
            .unwrap()
            .get(SignalKind::Traces)
            .offer(message(SignalKind::Traces, "after-restart"));

        let records = driver.poll().await.unwrap();
        assert_eq!(records[0].sequence(), 43);
        assert_eq!(records[0].source_offset.session_id, driver.session_id());
        // Other signals were not restored and start fresh
        assert_eq!(driver.committed(SignalKind::Logs), -1);

        driver.stop().await;
    }

    #[tokio::test]
    async fn test_commit_tracks_delivered_sequences() {
        let mut driver = SourceDriver::new(test_config(), "commit-test");
        driver.start(&NoOffsets).await.unwrap();

        let queues = driver.queues().unwrap().clone();
        for i in 0..2 {
            queues
                .get(SignalKind::Metrics)
                .offer(message(SignalKind::Metrics, &format!("m{i}")));
        }
        let records = driver.poll().await.unwrap();

        let committer = driver.committer();
        // Commit from another task, concurrently with the driver being alive
        let handle = {
            let committer = committer.clone();
            let records = records.clone();
            tokio::spawn(async move {
                for record in &records {
                    committer.commit(record);
                }
            })
        };
        handle.await.unwrap();

        assert_eq!(driver.committed(SignalKind::Metrics), 2);
        driver.stop().await;
    }

    #[tokio::test]
    async fn test_stop_short_circuits_poll_and_drains_queues() {
        let mut driver = SourceDriver::new(test_config(), "stop-test");
        driver.start(&NoOffsets).await.unwrap();

        let queues = driver.queues().unwrap().clone();
        queues
            .get(SignalKind::Traces)
            .offer(message(SignalKind::Traces, "t"));
        queues
            .get(SignalKind::Metrics)
            .offer(message(SignalKind::Metrics, "m"));
        queues
            .get(SignalKind::Logs)
            .offer(message(SignalKind::Logs, "l"));

        let started = Instant::now();
        driver.stop().await;
        assert!(started.elapsed() < Duration::from_secs(10));

        // Buffered messages were discarded, not produced
        assert!(driver.poll().await.is_none());
        assert_eq!(driver.metrics().records_produced(), 0);
    }

    #[tokio::test]
    async fn test_start_fails_on_port_conflict_and_unregisters_metrics() {
        let config = test_config();
        let mut first = SourceDriver::new(config.clone(), "bind-ok");
        first.start(&NoOffsets).await.unwrap();

        let mut second = SourceDriver::new(config, "bind-conflict");
        let result = second.start(&NoOffsets).await;
        assert!(result.is_err());
        assert!(crate::ingress::metrics::get("bind-conflict").is_none());

        first.stop().await;
    }

    #[tokio::test]
    async fn test_start_rejects_config_with_both_receivers_disabled() {
        let mut config = test_config();
        config.grpc.enabled = false;
        config.http.enabled = false;

        let mut driver = SourceDriver::new(config, "disabled-test");
        assert!(driver.start(&NoOffsets).await.is_err());
    }
}
