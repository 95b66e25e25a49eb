//! Command implementations behind the clap surface.

pub mod ui;

use crate::core::config::AppConfig;
use crate::gateway::DataSourceGateway;
use crate::service::FundDataService;
use crate::session::oracle::MessagesApiOracle;
use crate::session::Session;
use crate::store::CacheStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::error;

/// Interactive conversation loop. Missing oracle credentials abort here,
/// before any store or network activity.
pub async fn start(config: &AppConfig) -> Result<()> {
    let oracle = Arc::new(MessagesApiOracle::new(&config.oracle)?);

    let data_path = config.data_path()?;
    std::fs::create_dir_all(&data_path)
        .with_context(|| format!("Failed to create data directory {}", data_path.display()))?;
    let store = Arc::new(CacheStore::open(&data_path)?);
    let gateway = DataSourceGateway::new(store.clone(), &config.providers);
    let service = Arc::new(FundDataService::new(store, gateway, config.ttl.clone()));
    let mut session = Session::new(oracle, service);

    ui::banner();
    ui::print_advisor(Session::greeting());
    loop {
        let Some(input) = ui::read_input()? else {
            break;
        };
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        match session.handle(&input).await {
            Ok(reply) => ui::print_advisor(&reply),
            Err(e) => {
                error!("Turn failed: {e:#}");
                ui::print_notice("Something went wrong handling that; please try again.");
            }
        }
    }
    Ok(())
}

/// Shows which endpoints and credentials are configured and when each data
/// category last refreshed successfully.
pub fn config_status(config: &AppConfig) -> Result<()> {
    println!("Configuration");
    ui::status_line(
        "config file",
        &AppConfig::default_config_path()?.display().to_string(),
        true,
    );
    let data_path = config.data_path()?;
    ui::status_line("data directory", &data_path.display().to_string(), data_path.exists());

    println!("\nProviders");
    ui::status_line("eastmoney", &config.providers.eastmoney_base_url, true);
    ui::status_line("sina", &config.providers.sina_base_url, true);
    let token = config.providers.resolved_tushare_token().is_some();
    ui::status_line(
        "tushare",
        if token { "token configured" } else { "no token, adapter disabled" },
        token,
    );

    println!("\nOracle");
    ui::status_line("model", &config.oracle.model, true);
    let key = config.oracle.require_api_key().is_ok();
    ui::status_line(
        "api key",
        if key { "configured" } else { "missing (ANTHROPIC_API_KEY)" },
        key,
    );

    if data_path.exists() {
        println!("\nLast successful refresh");
        let store = CacheStore::open(&data_path)?;
        for category in [
            "fund_list", "daily_nav", "history", "holdings", "rating", "basic_info", "size",
        ] {
            match store.last_success(category)? {
                Some(at) => ui::status_line(category, &at.to_rfc3339(), true),
                None => ui::status_line(category, "never", false),
            }
        }
    }
    Ok(())
}
