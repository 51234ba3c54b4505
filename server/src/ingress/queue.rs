//! Signal queue fabric
//!
//! Three independent bounded FIFOs, one per signal, between receipt and
//! hand-off. Receiver workers are the producers (many, concurrent); the
//! driver's poll is the single consumer. Producers never wait: an offer
//! against a full queue fails and the message is dropped by the caller.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::{OtlpMessage, SignalKind};

/// Producer handle for one bounded signal queue - clone and share freely
#[derive(Debug, Clone)]
pub struct SignalQueue {
    signal: SignalKind,
    tx: mpsc::Sender<OtlpMessage>,
    capacity: usize,
}

impl SignalQueue {
    /// Non-blocking enqueue. Returns false when the queue is full.
    pub fn offer(&self, message: OtlpMessage) -> bool {
        self.tx.try_send(message).is_ok()
    }

    /// Number of messages currently buffered
    pub fn size(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Remaining capacity
    pub fn remaining(&self) -> usize {
        self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }
}

/// Consumer side of one signal queue, held by the driver's poll loop
pub struct SignalQueueConsumer {
    signal: SignalKind,
    rx: mpsc::Receiver<OtlpMessage>,
}

impl SignalQueueConsumer {
    /// Wait up to `timeout` for one message
    pub async fn poll(&mut self, timeout: Duration) -> Option<OtlpMessage> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok()?
    }

    /// Best-effort drain of at most `max` available messages, without blocking
    pub fn drain_up_to(&mut self, max: usize) -> Vec<OtlpMessage> {
        let mut drained = Vec::new();
        while drained.len() < max {
            match self.rx.try_recv() {
                Ok(message) => drained.push(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        drained
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }
}

/// Create one bounded queue for a signal
pub fn signal_queue(signal: SignalKind, capacity: usize) -> (SignalQueue, SignalQueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        SignalQueue {
            signal,
            tx,
            capacity,
        },
        SignalQueueConsumer { signal, rx },
    )
}

/// Producer handles for all three signal queues
#[derive(Debug, Clone)]
pub struct QueueSet {
    traces: SignalQueue,
    metrics: SignalQueue,
    logs: SignalQueue,
}

impl QueueSet {
    pub fn get(&self, signal: SignalKind) -> &SignalQueue {
        match signal {
            SignalKind::Traces => &self.traces,
            SignalKind::Metrics => &self.metrics,
            SignalKind::Logs => &self.logs,
        }
    }
}

/// Consumer sides for all three signal queues
pub struct QueueConsumers {
    traces: SignalQueueConsumer,
    metrics: SignalQueueConsumer,
    logs: SignalQueueConsumer,
}

impl QueueConsumers {
    pub fn get_mut(&mut self, signal: SignalKind) -> &mut SignalQueueConsumer {
        match signal {
            SignalKind::Traces => &mut self.traces,
            SignalKind::Metrics => &mut self.metrics,
            SignalKind::Logs => &mut self.logs,
        }
    }
}

/// Create the full fabric: one independent bounded queue per signal,
/// all with the same capacity
pub fn queue_set(capacity: usize) -> (QueueSet, QueueConsumers) {
    let (traces, traces_rx) = signal_queue(SignalKind::Traces, capacity);
    let (metrics, metrics_rx) = signal_queue(SignalKind::Metrics, capacity);
    let (logs, logs_rx) = signal_queue(SignalKind::Logs, capacity);
    (
        QueueSet {
            traces,
            metrics,
            logs,
        },
        QueueConsumers {
            traces: traces_rx,
            metrics: metrics_rx,
            logs: logs_rx,
        },
    )
}
