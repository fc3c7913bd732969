use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use retire::api::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Simulate(args) => {
            let report = api::simulate(&args)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Solve { sim, solve } => {
            let report = api::solve(&sim, &solve)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { port } => {
            api::run_http_server(port)
                .await
                .with_context(|| format!("server on port {port} failed"))?;
        }
    }
    Ok(())
}
