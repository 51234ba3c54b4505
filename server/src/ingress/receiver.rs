//! OTLP receiver
//!
//! Owns the gRPC and HTTP servers and the queue fabric between them and the
//! source driver. Listeners are bound eagerly during start so a port that
//! cannot be acquired fails the whole start instead of a background task.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::IngressConfig;
use crate::core::constants::RECEIVER_SHUTDOWN_TIMEOUT_SECS;

use super::codec::{EncodeError, PayloadCodec};
use super::grpc::OtlpGrpcServer;
use super::http::OtlpHttpServer;
use super::metrics::IngressMetrics;
use super::queue::{QueueConsumers, QueueSet, SignalQueue, queue_set};
use super::{OtlpMessage, SignalKind};

/// Shared per-signal handler logic: codec, queue and accounting.
///
/// Both receivers are thin protocol adapters around this; the gRPC and HTTP
/// services are sibling handlers parameterised by signal, not a hierarchy.
#[derive(Clone)]
pub struct SignalPipeline {
    signal: SignalKind,
    codec: PayloadCodec,
    queue: SignalQueue,
    metrics: Arc<IngressMetrics>,
}

impl SignalPipeline {
    pub fn new(
        signal: SignalKind,
        codec: PayloadCodec,
        queue: SignalQueue,
        metrics: Arc<IngressMetrics>,
    ) -> Self {
        Self {
            signal,
            codec,
            queue,
            metrics,
        }
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }

    /// Convert a decoded export request and offer it to this signal's queue.
    ///
    /// Returns `Ok(true)` when buffered, `Ok(false)` when the queue was full
    /// (the drop is counted and logged here), `Err` when the codec rejected
    /// the request - in that case nothing was enqueued or counted.
    pub fn accept<T>(&self, request: &T) -> Result<bool, EncodeError>
    where
        T: prost::Message + Serialize,
    {
        let payload = self.codec.encode(request)?;
        let message = OtlpMessage::new(self.signal, payload);

        if self.queue.offer(message) {
            self.metrics.increment_received(self.signal);
            Ok(true)
        } else {
            self.metrics.increment_dropped(self.signal);
            tracing::warn!(
                signal = %self.signal,
                queue_size = self.queue.size(),
                "OTLP message dropped: queue full"
            );
            Ok(false)
        }
    }
}

struct ServerTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// The OTLP ingress: both servers plus the queue fabric
pub struct OtlpReceiver {
    config: IngressConfig,
    queues: QueueSet,
    metrics: Arc<IngressMetrics>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    grpc_addr: Option<SocketAddr>,
    http_addr: Option<SocketAddr>,
    tasks: Vec<ServerTask>,
}

impl OtlpReceiver {
    /// Create the receiver and its queue fabric. The consumer halves go to
    /// the driver; the receiver keeps the producer halves.
    pub fn new(config: IngressConfig, metrics: Arc<IngressMetrics>) -> (Self, QueueConsumers) {
        let (queues, consumers) = queue_set(config.queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                config,
                queues,
                metrics,
                shutdown_tx,
                shutdown_rx,
                grpc_addr: None,
                http_addr: None,
                tasks: Vec::new(),
            },
            consumers,
        )
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    /// Actual gRPC listen address once started
    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.grpc_addr
    }

    /// Actual HTTP listen address once started
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    fn pipeline(&self, signal: SignalKind) -> SignalPipeline {
        SignalPipeline::new(
            signal,
            PayloadCodec::new(self.config.message_format),
            self.queues.get(signal).clone(),
            Arc::clone(&self.metrics),
        )
    }

    /// Bind and start the enabled servers.
    ///
    /// Both listeners are bound before either server is spawned, so a failed
    /// bind leaves no half-started server behind.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            grpc_enabled = self.config.grpc.enabled,
            grpc_port = self.config.grpc.port,
            http_enabled = self.config.http.enabled,
            http_port = self.config.http.port,
            tls_enabled = self.config.tls.enabled,
            message_format = %self.config.message_format,
            "OTLP receiver starting"
        );

        let bind_ip: IpAddr = self.config.bind_address.parse().with_context(|| {
            format!("invalid otlp.bind.address: {}", self.config.bind_address)
        })?;

        let grpc = if self.config.grpc.enabled {
            let addr = SocketAddr::new(bind_ip, self.config.grpc.port);
            let server = OtlpGrpcServer::bind(
                addr,
                self.pipeline(SignalKind::Traces),
                self.pipeline(SignalKind::Metrics),
                self.pipeline(SignalKind::Logs),
                self.config.http.body_limit_bytes,
            )
            .await
            .with_context(|| format!("failed to bind OTLP gRPC listener on {addr}"))?;
            Some(server)
        } else {
            None
        };

        let http = if self.config.http.enabled {
            let addr = SocketAddr::new(bind_ip, self.config.http.port);
            let server = OtlpHttpServer::bind(
                addr,
                self.pipeline(SignalKind::Traces),
                self.pipeline(SignalKind::Metrics),
                self.pipeline(SignalKind::Logs),
                self.config.http.body_limit_bytes,
            )
            .await
            .with_context(|| format!("failed to bind OTLP HTTP listener on {addr}"))?;
            Some(server)
        } else {
            None
        };

        if let Some(server) = grpc {
            let addr = server.local_addr()?;
            self.grpc_addr = Some(addr);
            let shutdown_rx = self.shutdown_rx.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = server.start(shutdown_rx).await {
                    tracing::error!(error = %e, "OTLP gRPC server error");
                }
            });
            self.tasks.push(ServerTask {
                name: "grpc",
                handle,
            });
            tracing::info!(%addr, "OTLP gRPC server started");
        }

        if let Some(server) = http {
            let addr = server.local_addr()?;
            self.http_addr = Some(addr);
            let shutdown_rx = self.shutdown_rx.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = server.start(shutdown_rx).await {
                    tracing::error!(error = %e, "OTLP HTTP server error");
                }
            });
            self.tasks.push(ServerTask {
                name: "http",
                handle,
            });
            tracing::info!(%addr, "OTLP HTTP server started");
        }

        Ok(())
    }

    /// Stop both servers: request graceful shutdown, wait up to the per-server
    /// window for in-flight requests, then force termination.
    pub async fn stop(&mut self) {
        tracing::info!("OTLP receiver stopping");
        let _ = self.shutdown_tx.send(true);

        let window = Duration::from_secs(RECEIVER_SHUTDOWN_TIMEOUT_SECS);
        for mut task in self.tasks.drain(..) {
            match tokio::time::timeout(window, &mut task.handle).await {
                Ok(_) => tracing::info!(server = task.name, "server stopped"),
                Err(_) => {
                    tracing::warn!(
                        server = task.name,
                        timeout_secs = window.as_secs(),
                        "server shutdown timed out, forcing termination"
                    );
                    task.handle.abort();
                    let _ = task.handle.await;
                }
            }
        }

        tracing::info!(
            traces_received = self.metrics.received(SignalKind::Traces),
            metrics_received = self.metrics.received(SignalKind::Metrics),
            logs_received = self.metrics.received(SignalKind::Logs),
            traces_dropped = self.metrics.dropped(SignalKind::Traces),
            metrics_dropped = self.metrics.dropped(SignalKind::Metrics),
            logs_dropped = self.metrics.dropped(SignalKind::Logs),
            "OTLP receiver stopped"
        );
    }
}
