//! Core application
//!
//! Standalone host around the source driver: it plays the role the
//! integration framework plays in managed deployments - polling the driver,
//! dispatching records to a sink, committing them and persisting offsets.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::cli::{self, CliConfig};
use crate::core::config::IngressConfig;
use crate::core::constants::{
    APP_NAME_LOWER, DEFAULT_DATA_DIR, ENV_LOG, IDLE_POLL_PAUSE_MS, OFFSETS_FILE_NAME,
};
use crate::core::shutdown::ShutdownService;
use crate::source::driver::{Committer, SourceDriver};
use crate::source::offsets::FileOffsetStore;
use crate::source::sink::{RecordSink, StdoutSink};

pub struct IngressApp;

impl IngressApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        let cli = cli::parse();
        let config = IngressConfig::load(&cli)?;
        let connector_name = cli
            .connector_name
            .clone()
            .unwrap_or_else(generate_connector_name);

        let data_dir = Self::data_dir(&cli);
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        let offset_store = FileOffsetStore::open(data_dir.join(OFFSETS_FILE_NAME))?;

        let shutdown = ShutdownService::new();
        shutdown.install_signal_handlers();

        let mut driver = SourceDriver::new(config, connector_name);
        driver.start(&offset_store).await?;

        let committer = driver.committer();
        let sink = StdoutSink::new();
        Self::poll_loop(&mut driver, &committer, &sink, &offset_store, &shutdown).await;

        driver.stop().await;
        Ok(())
    }

    /// Drive the poll/commit contract until shutdown is requested
    async fn poll_loop(
        driver: &mut SourceDriver,
        committer: &Committer,
        sink: &dyn RecordSink,
        offset_store: &FileOffsetStore,
        shutdown: &ShutdownService,
    ) {
        while !shutdown.is_triggered() {
            match driver.poll().await {
                Some(records) => {
                    for record in records {
                        if let Err(e) = sink.deliver(&record) {
                            tracing::error!(
                                error = %e,
                                topic = %record.topic,
                                sequence = record.sequence(),
                                "failed to deliver record to sink"
                            );
                            continue;
                        }
                        committer.commit(&record);
                        if let Err(e) = offset_store.record(&record.source_offset) {
                            tracing::warn!(error = %e, "failed to persist committed offset");
                        }
                    }
                }
                None => tokio::time::sleep(Duration::from_millis(IDLE_POLL_PAUSE_MS)).await,
            }
        }
    }

    fn data_dir(cli: &CliConfig) -> PathBuf {
        cli.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}

/// Connector name when none is configured: stable prefix plus a short
/// random suffix so parallel unnamed instances do not collide in metrics
fn generate_connector_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("otlp-ingress-{}", &suffix[..8])
}
