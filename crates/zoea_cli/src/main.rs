//! CLI entry point for the zoea swarm.

mod cli;
mod commands;
mod output;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    output::init(cli.output);

    let telemetry = zoea_observability::Telemetry::from_env()
        .console(cli.verbose)
        .init();
    let telemetry = match telemetry {
        Ok(guard) => Some(guard),
        Err(e) => {
            output::warning(&format!("tracing init failed: {e}"));
            None
        }
    };

    if let Err(e) = commands::handle(cli).await {
        output::error(&e.to_string());
        // process::exit skips drops; flush spans by hand.
        if let Some(guard) = &telemetry {
            guard.flush();
        }
        std::process::exit(1);
    }
}
