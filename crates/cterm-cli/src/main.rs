//! cterm — interactive terminal sessions against dashboard-managed clusters.
//!
//! Negotiates a terminal session for a named cluster through the
//! dashboard's REST API, then bridges the local terminal to the remote
//! shell over a persistent WebSocket channel.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing::error;

/// cterm — cluster terminal client
#[derive(Parser)]
#[command(
    name = "cterm",
    version = "0.1.0",
    about = "Interactive terminal sessions against dashboard-managed clusters"
)]
struct Cli {
    /// Dashboard base URL
    #[arg(short, long, global = true)]
    dashboard: Option<String>,

    /// Access token for dashboard requests
    #[arg(long, global = true, env = "CTERM_TOKEN")]
    token: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Positional argument: cluster name (shorthand for `connect`).
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Open an interactive terminal session against a cluster
    Connect {
        /// Cluster name
        cluster: String,
    },

    /// Negotiate a session and print the descriptor without connecting
    Resolve {
        /// Cluster name
        cluster: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("cterm=debug,cterm_cli=debug,cterm_client=debug,cterm_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("cterm=warn,cterm_cli=warn,cterm_client=warn")
            .with_target(false)
            .init();
    }

    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".cterm")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    });
    let cfg = config::Config::load(&config_path).unwrap_or_default();

    // CLI flags override config file values.
    let dashboard = cli.dashboard.clone().or_else(|| {
        if cfg.default.dashboard.is_empty() {
            None
        } else {
            Some(cfg.default.dashboard.clone())
        }
    });
    let token = cli.token.clone().or_else(|| {
        if cfg.default.token.is_empty() {
            None
        } else {
            Some(cfg.default.token.clone())
        }
    });

    let Some(dashboard) = dashboard else {
        eprintln!(
            "cterm: no dashboard URL configured\n\
             Pass --dashboard <url> or set `dashboard` in {config_path}"
        );
        std::process::exit(2);
    };

    let result = match cli.command {
        Some(Command::Connect { cluster }) => {
            commands::connect::run(&cluster, &dashboard, token.as_deref()).await
        }
        Some(Command::Resolve { cluster }) => {
            commands::resolve::run(&cluster, &dashboard, token.as_deref()).await
        }
        None => {
            // Positional shorthand: cterm <cluster>
            match cli.args.first() {
                Some(cluster) => {
                    commands::connect::run(cluster, &dashboard, token.as_deref()).await
                }
                None => {
                    eprintln!(
                        "Usage: cterm <cluster>\n       cterm <subcommand>\n\n\
                         Run `cterm --help` for full usage."
                    );
                    std::process::exit(1);
                }
            }
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("cterm: {e:#}");
        std::process::exit(1);
    }
}
