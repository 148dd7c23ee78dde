//! Tonada CLI - offline renderer for the tonada synthesizer.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tonada")]
#[command(author, version, about = "Tonada synthesizer CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a built-in demo sequence to a WAV file
    Demo(commands::demo::DemoArgs),

    /// Render a TOML instrument file playing a note sequence
    Render(commands::render::RenderArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo(args) => commands::demo::run(args),
        Commands::Render(args) => commands::render::run(args),
    }
}
