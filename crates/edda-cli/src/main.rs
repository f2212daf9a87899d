mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "edda")]
#[command(about = "GPT-2 inference and checkpoint tooling", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage models (list, download, info)
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },

    /// Download a model if needed and run a smoke forward pass
    Verify {
        /// Model preset (gpt2, gpt2-medium, gpt2-large, gpt2-xl)
        #[arg(default_value = "gpt2")]
        model: String,

        /// Number of synthetic tokens to feed through the decoder
        #[arg(short = 'n', long, default_value_t = 16)]
        tokens: usize,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List the supported model presets
    List,

    /// Download config and weights for a preset
    Download {
        /// Model preset (gpt2, gpt2-medium, gpt2-large, gpt2-xl)
        name: String,
    },

    /// Show details for a preset
    Info { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    std::env::set_var("RUST_LOG", log_level);
    env_logger::init();

    match cli.command {
        Commands::Model { action } => commands::model::run(action).await,
        Commands::Verify { model, tokens } => commands::verify::run(&model, tokens).await,
    }
}
