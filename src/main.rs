//! WireKV server entry point.
//!
//! Parses command-line options, sets up logging, and runs the listener until
//! Ctrl+C.

use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wirekv::server::{Server, ServerConfig};

/// Parse configuration from command-line arguments
fn config_from_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                config.host = option_value(&args, i).to_string();
                i += 2;
            }
            "--port" | "-p" => {
                config.port = option_value(&args, i).parse().unwrap_or_else(|_| {
                    eprintln!("Error: invalid port number");
                    std::process::exit(1);
                });
                i += 2;
            }
            "--max-clients" | "-c" => {
                config.max_clients = match option_value(&args, i).parse() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        eprintln!("Error: --max-clients must be a positive integer");
                        std::process::exit(1);
                    }
                };
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("WireKV version {}", wirekv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

/// Returns the value following the flag at `i`, or exits.
fn option_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value.as_str(),
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
WireKV - A Small In-Memory Key-Value Server

USAGE:
    wirekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: {host})
    -p, --port <PORT>          Port to listen on (default: {port})
    -c, --max-clients <N>      Connections served concurrently (default: {clients})
    -v, --version              Print version information
        --help                 Print this help message

Set RUST_LOG (e.g. RUST_LOG=wirekv=debug) to adjust logging.
"#,
        host = wirekv::DEFAULT_HOST,
        port = wirekv::DEFAULT_PORT,
        clients = wirekv::DEFAULT_MAX_CLIENTS,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("WireKV v{}", wirekv::VERSION);

    let server = Server::new(config);
    let listener = server.bind().await?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        result = server.run(listener) => result?,
        _ = shutdown => {}
    }

    let stats = server.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        command_errors = stats.command_errors.load(Ordering::Relaxed),
        keys = server.storage().len(),
        "Server shutdown complete"
    );
    Ok(())
}
