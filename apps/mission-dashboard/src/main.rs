mod commands;

use anyhow::Result;
use clap::Parser;

use mission_dashboard::cli::{Cli, Commands};
use mission_dashboard::config::DashboardConfig;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,mission_dashboard=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = DashboardConfig::from_env()?;
    init_tracing()?;
    if let Some(dir) = cli.state_dir.clone() {
        config.state_dir = dir;
    }

    let json = cli.json;
    match cli.command {
        Commands::Missions => commands::missions(&config, json).await,
        Commands::Map(args) => commands::map(&config, args).await,
        Commands::Register(args) => commands::register(&config, args, json).await,
        Commands::Login(args) => commands::login(&config, args, json).await,
        Commands::Logout => commands::logout(&config, json).await,
        Commands::VerifyEmail(args) => commands::verify_email(&config, args).await,
        Commands::Whoami => commands::whoami(&config, json).await,
        Commands::Locate(args) => commands::locate(&config, args, json).await,
    }
}
