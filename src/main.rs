use clap::{Parser, Subcommand};
use anyhow::Result;
use dotenvy::dotenv;

mod config;
mod extract;
mod feed;
mod gallery;
mod llm;
mod output;
mod scan;
mod telemetry;

#[derive(Parser)]
#[command(name = "statblock", about = "Pull monster statblocks out of reddit gallery posts")]
struct Cli {
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Scan(scan::ScanCmd),
    Extract(extract::ExtractCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and STATBLOCK_LOG_FORMAT
    telemetry::config::init_tracing();

    match cli.command {
        Commands::Scan(args) => scan::run(args).await?,
        Commands::Extract(args) => extract::run(args).await?,
    }

    Ok(())
}
