//! Opdeck CLI — runtime-extensible data operations.

use clap::Parser;
use opdeck::cli::Cli;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    if let Err(e) = opdeck::cli::dispatch(cli.command, &cli.paths) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
