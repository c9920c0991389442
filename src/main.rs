//! FluxKV server entry point.
//!
//! Parses flags, wires up the store, sweeper, and listener, and drives
//! the graceful-shutdown sequence on interrupt.

use fluxkv::storage::{Store, Sweeper, SWEEP_INTERVAL};
use fluxkv::{InputMode, Server};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration.
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Input mode for all connections
    mode: InputMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: fluxkv::DEFAULT_HOST.to_string(),
            port: fluxkv::DEFAULT_PORT,
            mode: InputMode::Resp,
        }
    }
}

impl Config {
    /// Parses configuration from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--human" => {
                    config.mode = InputMode::Human;
                    i += 1;
                }
                "--version" | "-v" => {
                    println!("FluxKV version {}", fluxkv::VERSION);
                    std::process::exit(0);
                }
                "--help" => {
                    print_help();
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

    /// The bind address as a string.
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
FluxKV - An In-Memory Key-Value Server

USAGE:
    fluxkv [OPTIONS]

OPTIONS:
        --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6380)
        --human          Read whitespace-tokenized lines instead of RESP
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    fluxkv                         # Start on 127.0.0.1:6380
    fluxkv --port 7000             # Start on port 7000
    fluxkv --host 0.0.0.0          # Listen on all interfaces
    fluxkv --human                 # Accept "SET foo bar" style lines

CONNECTING:
    Use redis-cli or any RESP2 client:
    $ redis-cli -p 6380
    127.0.0.1:6380> PING
    PONG
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
FluxKV v{} - In-Memory Key-Value Server
────────────────────────────────────────
Listening on {}
Input mode: {}

Use Ctrl+C to shut down gracefully.
"#,
        fluxkv::VERSION,
        config.bind_address(),
        match config.mode {
            InputMode::Resp => "RESP",
            InputMode::Human => "human",
        },
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    print_banner(&config);

    // the one store shared by every connection and the sweeper
    let store = Arc::new(Store::new());
    let sweeper = Sweeper::start(Arc::clone(&store), SWEEP_INTERVAL);

    let server = Server::bind(&config.bind_address(), store, config.mode).await?;

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received, stopping server");
    };

    let drained = server.run(shutdown).await;
    sweeper.stop();

    match drained {
        Ok(()) => info!("server shutdown complete"),
        Err(e) => warn!(error = %e, "server shutdown with connections still live"),
    }

    Ok(())
}
