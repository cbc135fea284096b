use std::env;
use std::io;
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use memo_vault::{load_config, run, Engine};

#[tokio::main]
async fn main() {
    if let Err(err) = run_app().await {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        return Err(anyhow!("Usage: memo-vault <requests.csv> [config.toml]"));
    }

    let config = load_config(args.get(2).map(Path::new))?;

    // Replies go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(io::stderr)
        .json()
        .init();
    config.log_summary();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_file = %config.data_file.display(),
        "Starting memo vault"
    );

    let engine = Engine::open(&config)
        .await
        .with_context(|| format!("Failed to open journal {}", config.data_file.display()))?;

    run(Arc::new(engine), &args[1], io::stdout())
        .await
        .map_err(|err| anyhow!(err))
        .context("Failed to process requests")?;
    Ok(())
}
