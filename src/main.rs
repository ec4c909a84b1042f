//! cachelink - checks and exercises a single Redis connection.

use cachelink::cli::{Cli, Command, OutputFormat};
use cachelink::config::Config;
use cachelink::connection::{ConnectionManager, ConnectionState};
use cachelink::error::{CacheError, Result};
use cachelink::logging;
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info};

/// Outcome of a run, printed on stdout.
#[derive(Debug, Serialize)]
struct Report {
    target: String,
    state: ConnectionState,
    connected: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pings: Vec<PingReply>,
}

#[derive(Debug, Serialize)]
struct PingReply {
    reply: String,
    latency_ms: f64,
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    let config = match Config::load_from_file(&cli.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    };

    logging::init(&config.logging, cli.log_file);

    if let Err(e) = run(&cli, &config).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let format = cli.parse_output_format().map_err(CacheError::config)?;

    let mut options = cli.resolve_options(config)?;
    options.apply_env_defaults();
    info!("Connection: {}", options.display_string());

    let mut manager = ConnectionManager::new(options);

    let limit = cli.connect_timeout();
    let attempt = tokio::time::timeout(limit, manager.initialize()).await;
    match attempt {
        Ok(result) => result?,
        Err(_) => {
            manager.destroy();
            return Err(CacheError::connection(format!(
                "No ready signal from {} within {}s",
                manager.options().display_string(),
                limit.as_secs()
            )));
        }
    }

    let mut report = Report {
        target: manager.options().display_string(),
        state: manager.state(),
        connected: manager.is_connected(),
        pings: Vec::new(),
    };

    match cli.command() {
        Command::Check => {
            manager.destroy();
        }
        Command::Ping { count } => {
            let client = manager.get_client()?;
            for _ in 0..count {
                let started = Instant::now();
                let reply = client.ping().await?;
                report.pings.push(PingReply {
                    reply,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                });
            }
            drop(client);
            manager.close().await?;
        }
    }

    print_report(&report, format)
}

fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|e| CacheError::internal(format!("Failed to encode report: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("{}: {}", report.target, report.state);
            for ping in &report.pings {
                println!("{} ({:.2} ms)", ping.reply, ping.latency_ms);
            }
        }
    }
    Ok(())
}
