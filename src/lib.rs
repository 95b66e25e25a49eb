pub mod cli;
pub mod core;
pub mod gateway;
pub mod providers;
pub mod screening;
pub mod service;
pub mod session;
pub mod store;

pub use crate::core::config;

use anyhow::Result;
use tracing::debug;

pub enum AppCommand {
    Start,
    ConfigStatus,
    Version,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Start => cli::start(&config).await,
        AppCommand::ConfigStatus => cli::config_status(&config),
        AppCommand::Version => {
            println!("fundrec {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
