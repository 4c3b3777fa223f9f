mod api;
mod commands;
mod notify;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dashwatch")]
#[command(about = "Watches dashboard tabs and raises alerts on anomalies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor daemon (poll loop + control API)
    Run {
        /// Port for the control API (overrides config control.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host for the control API (overrides config control.host)
        #[arg(long)]
        host: Option<String>,

        /// Chrome remote debugging port (overrides config browser.cdpPort)
        #[arg(long)]
        cdp_port: Option<u16>,
    },

    /// Show monitor status
    Status,

    /// Show the alert log, most recent first
    Alerts {
        /// Max entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show per-tab records
    Tabs,

    /// Pause or resume monitoring
    Toggle,

    /// Wipe all state and start over
    Reset,

    /// Empty the alert log
    ClearAlerts,

    /// Mute or unmute a tab
    Mute {
        /// Tab id as shown by `dashwatch tabs`
        tab_id: String,
    },

    /// Run one poll cycle now
    Poll,

    /// Control the tab revolver
    Revolver {
        #[command(subcommand)]
        command: RevolverCommands,
    },

    /// Classify, extract and evaluate a saved HTML page offline
    Inspect {
        /// Saved page (body or full document markup)
        file: PathBuf,

        /// URL the page was loaded from; drives classification
        #[arg(long, default_value = "")]
        url: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum RevolverCommands {
    /// Start if stopped, stop if running
    Toggle,
    /// Start rotating tabs
    Start,
    /// Stop rotating tabs
    Stop,
    /// Set the rotation interval
    Interval {
        /// Milliseconds (1000..=60000)
        ms: u64,
    },
    /// Show revolver state
    Status,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(cli.json_logs.then(|| fmt::layer().json()))
        .with((!cli.json_logs).then(fmt::layer))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            port,
            host,
            cdp_port,
        } => {
            commands::run_cmd::run(host, port, cdp_port).await?;
        }
        Commands::Status => {
            commands::status::status().await?;
        }
        Commands::Alerts { limit } => {
            commands::status::alerts(limit).await?;
        }
        Commands::Tabs => {
            commands::status::tabs().await?;
        }
        Commands::Toggle => {
            commands::control_cmd::toggle().await?;
        }
        Commands::Reset => {
            commands::control_cmd::reset().await?;
        }
        Commands::ClearAlerts => {
            commands::control_cmd::clear_alerts().await?;
        }
        Commands::Mute { tab_id } => {
            commands::control_cmd::mute(&tab_id).await?;
        }
        Commands::Poll => {
            commands::control_cmd::poll().await?;
        }
        Commands::Revolver { command } => match command {
            RevolverCommands::Toggle => commands::control_cmd::revolver("toggle").await?,
            RevolverCommands::Start => commands::control_cmd::revolver("start").await?,
            RevolverCommands::Stop => commands::control_cmd::revolver("stop").await?,
            RevolverCommands::Interval { ms } => commands::control_cmd::revolver_interval(ms).await?,
            RevolverCommands::Status => commands::control_cmd::revolver_status().await?,
        },
        Commands::Inspect { file, url } => {
            commands::inspect::run(&file, &url).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_cmd::show().await?,
            ConfigCommands::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
