use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hive::config::HiveToml;
use hive::logging::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "hive")]
#[command(version, about = "Workspace orchestration back-end")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to hive.toml. Missing files fall back to defaults.
    #[arg(long, global = true, env = "HIVE_CONFIG", default_value = "hive.toml")]
    pub config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to serve on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides database.path)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Run one cron sweep and print its report
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },
    /// Create the database and apply the schema
    InitDb {
        /// Database path (overrides database.path)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum CronCommands {
    /// Start janitor runs for every workspace with enabled janitors
    Janitors,
    /// Halt stale agent tasks and start queued work where pools have room
    TaskCoordinator,
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default hive.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format)?;

    // `config init` writes the file, so it must not require one to load.
    if let Commands::Config {
        command: Some(ConfigCommands::Init),
    } = &cli.command
    {
        return cmd::cmd_config_init(&cli.config);
    }

    let mut config = HiveToml::load_or_default(&cli.config)?;
    config.apply_process_env();

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(config, *port, db_path.clone(), *dev).await?
        }
        Commands::Cron { command } => cmd::cmd_cron(&config, *command).await?,
        Commands::InitDb { db_path } => cmd::cmd_init_db(&config, db_path.clone())?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, *command)?,
    }

    Ok(())
}
