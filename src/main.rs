use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundrec::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fundrec::AppCommand {
    fn from(cmd: Commands) -> fundrec::AppCommand {
        match cmd {
            Commands::Start => fundrec::AppCommand::Start,
            Commands::ConfigStatus => fundrec::AppCommand::ConfigStatus,
            Commands::Version => fundrec::AppCommand::Version,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Start the conversational recommendation loop
    Start,
    /// Show configured providers, credentials and cache state
    ConfigStatus,
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => fundrec::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = fundrec::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
providers:
  eastmoney_base_url: "https://fundapi.eastmoney.com"
  sina_base_url: "https://hq.sinajs.cn"
  tushare_base_url: "https://api.tushare.pro"
  # tushare_token: ""

oracle:
  model: "claude-sonnet-4-5"
  # api_key: ""

ttl:
  fund_list_hours: 24
  nav_hours: 24
  basic_info_days: 7
  holdings_days: 30
  rating_days: 7
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
