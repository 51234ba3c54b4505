//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use crate::app::IngressApp;
pub use cli::CliConfig;
pub use config::IngressConfig;
pub use shutdown::ShutdownService;
