//! MailMate CLI entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP relay gateway
//! - `ask`: Run one request through the relay from the terminal
//! - `doctor`: Diagnose configuration and provider reachability
//! - `init`: Write a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mailmate",
    about = "MailMate: email writing assistant backed by a language model",
    version,
    author
)]
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
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message through the relay
    Ask(commands::ask::AskArgs),

    /// Diagnose configuration and provider health
    Doctor,

    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask(args) => commands::ask::run(args).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Init => commands::init::run()?,
    }

    Ok(())
}

/// Logs go to stderr so `ask` output on stdout stays clean.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
