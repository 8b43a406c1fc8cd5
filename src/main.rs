//! Chat relay server binary
//!
//! Usage:
//!   cargo run -- --port 8080 --redis 127.0.0.1:6379
//!   RUST_LOG=debug cargo run

use std::env;

use banter::{RelayConfig, RelayServer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "help" || a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = parse_config(&args);
    info!(
        "Starting relay instance {} on port {}",
        config.instance_id, config.port
    );

    RelayServer::new(config).start().await?;
    Ok(())
}

fn print_usage() {
    println!("Banter - Multi-Instance Chat Relay");
    println!();
    println!("USAGE:");
    println!("    cargo run -- [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>            Port to listen on (default: 8080)");
    println!("    --id <ID>                Instance identifier (default: random UUID)");
    println!("    --redis <ADDR>           Redis address (default: 127.0.0.1:6379)");
    println!("    --redis-password <PASS>  Redis password (default: none)");
    println!();
    println!("Several instances pointed at the same Redis behave as one room:");
    println!("    cargo run -- --port 8080 --id a &");
    println!("    cargo run -- --port 8081 --id b &");
    println!();
    println!("    RUST_LOG=debug cargo run -- --port 8080");
}

fn parse_config(args: &[String]) -> RelayConfig {
    let mut config = RelayConfig::default();

    if let Some(port) = flag_value(args, "--port").and_then(|v| v.parse().ok()) {
        config.port = port;
    }
    if let Some(id) = flag_value(args, "--id") {
        config.instance_id = id.to_string();
    }
    if let Some(addr) = flag_value(args, "--redis") {
        config.redis_addr = addr.to_string();
    }
    if let Some(password) = flag_value(args, "--redis-password") {
        config.redis_password = Some(password.to_string());
    }

    config
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    for i in 0..args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(&args[i + 1]);
        }
    }
    None
}
