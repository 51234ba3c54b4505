//! Operational metrics surface
//!
//! Wait-free counters and gauges for the ingress hot path, with derived
//! values computed on read. Instances are registered in a process-global
//! registry keyed by connector name so operational tooling can look them up;
//! a same-named registration replaces the previous one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::Serialize;

use super::SignalKind;

static REGISTRY: LazyLock<RwLock<HashMap<String, Arc<IngressMetrics>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register metrics under their connector name, replacing any prior
/// registration with the same name. Never fails on collision.
pub fn register(metrics: Arc<IngressMetrics>) {
    let name = metrics.connector_name().to_string();
    let previous = REGISTRY.write().insert(name.clone(), metrics);
    if previous.is_some() {
        tracing::warn!(
            connector_name = %name,
            "metrics already registered, replacing previous registration"
        );
    } else {
        tracing::debug!(connector_name = %name, "metrics registered");
    }
}

/// Remove a registration. A no-op when the name is unknown.
pub fn unregister(connector_name: &str) {
    if REGISTRY.write().remove(connector_name).is_some() {
        tracing::debug!(connector_name = %connector_name, "metrics unregistered");
    }
}

/// Look up the registered metrics for a connector
pub fn get(connector_name: &str) -> Option<Arc<IngressMetrics>> {
    REGISTRY.read().get(connector_name).cloned()
}

/// Counters and gauges for one ingress instance
pub struct IngressMetrics {
    connector_name: String,
    received: [AtomicU64; 3],
    dropped: [AtomicU64; 3],
    records_produced: AtomicU64,
    queue_size: [AtomicU64; 3],
    queue_capacity: AtomicU64,
}

impl IngressMetrics {
    pub fn new(connector_name: impl Into<String>) -> Self {
        Self {
            connector_name: connector_name.into(),
            received: Default::default(),
            dropped: Default::default(),
            records_produced: AtomicU64::new(0),
            queue_size: Default::default(),
            queue_capacity: AtomicU64::new(0),
        }
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    // =========================================================================
    // Updates (all wait-free)
    // =========================================================================

    pub fn increment_received(&self, signal: SignalKind) {
        self.received[signal.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped(&self, signal: SignalKind) {
        self.dropped[signal.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_produced(&self, count: u64) {
        self.records_produced.fetch_add(count, Ordering::Relaxed);
    }

    pub fn update_queue_size(&self, signal: SignalKind, size: u64) {
        self.queue_size[signal.index()].store(size, Ordering::Relaxed);
    }

    pub fn set_queue_capacity(&self, capacity: u64) {
        self.queue_capacity.store(capacity, Ordering::Relaxed);
    }

    /// Clear all counters. Gauges (queue sizes, capacity) are preserved.
    pub fn reset_counters(&self) {
        for i in 0..3 {
            self.received[i].store(0, Ordering::Relaxed);
            self.dropped[i].store(0, Ordering::Relaxed);
        }
        self.records_produced.store(0, Ordering::Relaxed);
        tracing::info!(connector_name = %self.connector_name, "metrics counters reset");
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn received(&self, signal: SignalKind) -> u64 {
        self.received[signal.index()].load(Ordering::Relaxed)
    }

    pub fn dropped(&self, signal: SignalKind) -> u64 {
        self.dropped[signal.index()].load(Ordering::Relaxed)
    }

    pub fn records_produced(&self) -> u64 {
        self.records_produced.load(Ordering::Relaxed)
    }

    pub fn queue_size(&self, signal: SignalKind) -> u64 {
        self.queue_size[signal.index()].load(Ordering::Relaxed)
    }

    pub fn queue_capacity(&self) -> u64 {
        self.queue_capacity.load(Ordering::Relaxed)
    }

    pub fn total_received(&self) -> u64 {
        SignalKind::ALL.iter().map(|s| self.received(*s)).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        SignalKind::ALL.iter().map(|s| self.dropped(*s)).sum()
    }

    /// Highest queue fill level across the three signals, in percent.
    /// Returns 0 while the capacity gauge is unset.
    pub fn max_queue_utilization_percent(&self) -> f64 {
        let capacity = self.queue_capacity();
        if capacity == 0 {
            return 0.0;
        }
        SignalKind::ALL
            .iter()
            .map(|s| (self.queue_size(*s) as f64 * 100.0) / capacity as f64)
            .fold(0.0, f64::max)
    }

    /// Messages accepted but not yet produced as records
    pub fn total_lag(&self) -> u64 {
        self.total_received().saturating_sub(self.records_produced())
    }

    /// Dropped share of all received messages, in percent.
    /// Returns 0 while nothing has been received.
    pub fn drop_rate(&self) -> f64 {
        let received = self.total_received();
        if received == 0 {
            return 0.0;
        }
        (self.total_dropped() as f64 * 100.0) / received as f64
    }

    /// Point-in-time view with all derived values, for log lines and tooling
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connector_name: self.connector_name.clone(),
            traces_received: self.received(SignalKind::Traces),
            metrics_received: self.received(SignalKind::Metrics),
            logs_received: self.received(SignalKind::Logs),
            traces_dropped: self.dropped(SignalKind::Traces),
            metrics_dropped: self.dropped(SignalKind::Metrics),
            logs_dropped: self.dropped(SignalKind::Logs),
            records_produced: self.records_produced(),
            traces_queue_size: self.queue_size(SignalKind::Traces),
            metrics_queue_size: self.queue_size(SignalKind::Metrics),
            logs_queue_size: self.queue_size(SignalKind::Logs),
            queue_capacity: self.queue_capacity(),
            total_received: self.total_received(),
            total_dropped: self.total_dropped(),
            max_queue_utilization_percent: self.max_queue_utilization_percent(),
            total_lag: self.total_lag(),
            drop_rate: self.drop_rate(),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connector_name: String,
    pub traces_received: u64,
    pub metrics_received: u64,
    pub logs_received: u64,
    pub traces_dropped: u64,
    pub metrics_dropped: u64,
    pub logs_dropped: u64,
    pub records_produced: u64,
    pub traces_queue_size: u64,
    pub metrics_queue_size: u64,
    pub logs_queue_size: u64,
    pub queue_capacity: u64,
    pub total_received: u64,
    pub total_dropped: u64,
    pub max_queue_utilization_percent: f64,
    pub total_lag: u64,
    pub drop_rate: f64,
}
