//! Standalone web server binary
//!
//! Usage: cargo run -p parlor_web --bin parlor-web-server

use parlor_web::{AppSettings, ServerConfig, WebServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    parlor_web::init_logging();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut host = "127.0.0.1".to_string();
    let mut port = 8080u16;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --host requires a value");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("Error: --port requires a value");
                    std::process::exit(1);
                }
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

    // Storage backend comes from the environment, not the command line,
    // so deployments can switch without changing the unit file
    let settings = AppSettings::from_env();
    let config = ServerConfig::new(host, port);

    tracing::info!("Starting Parlor Web Server");
    tracing::info!("  Host: {}", config.host());
    tracing::info!("  Port: {}", config.port());
    tracing::info!("  Session TTL: {}s", settings.ttl_secs());

    // Create and start server
    let server = WebServer::new(config, settings);
    let handle = server.start().await?;

    tracing::info!("Server running at http://{}", handle.address());
    println!("\n✅ Server running at http://{}", handle.address());
    println!("   Press Ctrl+C to stop\n");

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down server");
    println!("\n🛑 Shutting down...");
    handle.shutdown().await?;
    tracing::info!("Server stopped cleanly");
    println!("✅ Server stopped cleanly\n");

    Ok(())
}

fn print_help() {
    println!("Parlor Web Server");
    println!();
    println!("Usage: parlor-web-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host, -h <HOST>           Host to bind to (default: 127.0.0.1)");
    println!("  --port, -p <PORT>           Port to bind to (default: 8080)");
    println!("  --help                      Show this help message");
    println!();
    println!("Environment:");
    println!("  PARLOR_KV_REST_URL          REST KV endpoint (memory backend if unset)");
    println!("  PARLOR_KV_REST_TOKEN        Bearer token for the KV endpoint");
    println!("  PARLOR_KV_TTL_SECS          Session lifetime in seconds (default: 86400)");
}
