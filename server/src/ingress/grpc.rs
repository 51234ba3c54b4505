//! gRPC OTLP receiver
//!
//! Implements the three OTLP collector services on top of tonic. Each export
//! call decodes into the generated request type, runs through the shared
//! signal pipeline and always acknowledges with the empty response:
//! acknowledgement means accepted for buffering, not delivered downstream.
//! A message dropped on a full queue is still acknowledged - OTLP has no
//! backpressure status, so the loss is only visible through metrics.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server as TonicServer;
use tonic::{Request, Response, Status};

use opentelemetry_proto::tonic::collector::{
    logs::v1::{
        ExportLogsServiceRequest, ExportLogsServiceResponse,
        logs_service_server::{LogsService, LogsServiceServer},
    },
    metrics::v1::{
        ExportMetricsServiceRequest, ExportMetricsServiceResponse,
        metrics_service_server::{MetricsService, MetricsServiceServer},
    },
    trace::v1::{
        ExportTraceServiceRequest, ExportTraceServiceResponse,
        trace_service_server::{TraceService, TraceServiceServer},
    },
};

use super::receiver::SignalPipeline;

pub struct OtlpGrpcServer {
    listener: TcpListener,
    traces: SignalPipeline,
    metrics: SignalPipeline,
    logs: SignalPipeline,
    max_message_size: usize,
}

impl OtlpGrpcServer {
    /// Bind the listener eagerly so a port conflict fails at start
    pub async fn bind(
        addr: SocketAddr,
        traces: SignalPipeline,
        metrics: SignalPipeline,
        logs: SignalPipeline,
        max_message_size: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            traces,
            metrics,
            logs,
            max_message_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let incoming = TcpListenerStream::new(self.listener);

        TonicServer::builder()
            .add_service(
                TraceServiceServer::new(OtlpTraceService {
                    pipeline: self.traces,
                })
                .max_decoding_message_size(self.max_message_size)
                .max_encoding_message_size(self.max_message_size),
            )
            .add_service(
                MetricsServiceServer::new(OtlpMetricsService {
                    pipeline: self.metrics,
                })
                .max_decoding_message_size(self.max_message_size)
                .max_encoding_message_size(self.max_message_size),
            )
            .add_service(
                LogsServiceServer::new(OtlpLogsService {
                    pipeline: self.logs,
                })
                .max_decoding_message_size(self.max_message_size)
                .max_encoding_message_size(self.max_message_size),
            )
            .serve_with_incoming_shutdown(incoming, async move {
                let _ = shutdown_rx.wait_for(|&v| v).await;
                tracing::debug!("OTLP gRPC server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// gRPC trace service
pub(crate) struct OtlpTraceService {
    pub(crate) pipeline: SignalPipeline,
}

#[tonic::async_trait]
impl TraceService for OtlpTraceService {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        let request = request.into_inner();
        match self.pipeline.accept(&request) {
            Ok(_) => Ok(Response::new(ExportTraceServiceResponse {
                partial_success: None,
            })),
            Err(e) => {
                tracing::error!(error = %e, "trace export failed");
                Err(Status::internal(e.to_string()))
            }
        }
    }
}

/// gRPC metrics service
pub(crate) struct OtlpMetricsService {
    pub(crate) pipeline: SignalPipeline,
}

#[tonic::async_trait]
impl MetricsService for OtlpMetricsService {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        let request = request.into_inner();
        match self.pipeline.accept(&request) {
            Ok(_) => Ok(Response::new(ExportMetricsServiceResponse {
                partial_success: None,
            })),
            Err(e) => {
                tracing::error!(error = %e, "metrics export failed");
                Err(Status::internal(e.to_string()))
            }
        }
    }
}

/// gRPC logs service
pub(crate) struct OtlpLogsService {
    pub(crate) pipeline: SignalPipeline,
}

#[tonic::async_trait]
impl LogsService for OtlpLogsService {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let request = request.into_inner();
        match self.pipeline.accept(&request) {
            Ok(_) => Ok(Response::new(ExportLogsServiceResponse {
                partial_success: None,
            })),
            Err(e) => {
                tracing::error!(error = %e, "logs export failed");
                Err(Status::internal(e.to_string()))
            }
        }
    }
}
