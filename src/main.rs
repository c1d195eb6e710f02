//! Hydroviewer Service - HTTP backend
//!
//! Serves streamflow charts and CSV downloads for three model families:
//! 1. ECMWF-RAPID forecasts and historic simulation from the SPT API
//! 2. LIS-RAPID discharge from local Qout archives
//! 3. HIWAT-RAPID discharge from local Qout archives
//!
//! Usage:
//!   cargo run --release                                # Use ./hydroviewer.toml
//!   cargo run --release -- --config /etc/hydro.toml    # Explicit config file
//!   cargo run --release -- --port 8081                 # Override the listen port
//!
//! Environment:
//!   HYDROVIEWER_CONFIG - config file path (overridden by --config)
//!   HYDROVIEWER_LIS_PATH, HYDROVIEWER_HIWAT_PATH - archive roots
//!   SPT_API_SOURCE, SPT_TOKEN - streamflow prediction tool API
//!   HYDROVIEWER_PORT - listen port
//!   RUST_LOG - log filter (default: info)

use hydroviewer_service::config::{AppConfig, DEFAULT_CONFIG_PATH};
use hydroviewer_service::endpoint;
use hydroviewer_service::ingest::archive::NetCdfOpener;
use hydroviewer_service::model::ModelFamily;
use hydroviewer_service::service::HydroService;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌊 Hydroviewer Service");
    println!("======================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut port_override: Option<u16> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
            }
            "--port" => {
                match args.get(i + 1).and_then(|p| p.parse().ok()) {
                    Some(port) => port_override = Some(port),
                    None => {
                        eprintln!("Error: --port requires a port number");
                        std::process::exit(1);
                    }
                }
                i += 2;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH] [--port PORT]", args[0]);
                std::process::exit(1);
            }
        }
    }

    let config_path = config_path
        .or_else(|| env::var("HYDROVIEWER_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Load configuration
    println!("📊 Loading configuration from {}...", config_path.display());
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Configuration failed: {}\n", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = port_override {
        config.server.port = port;
    }
    println!("✓ Configuration loaded\n");

    println!("📋 Model sources:");
    for family in ModelFamily::ALL {
        match config.archives.root_for(family) {
            Some(root) => println!("   {} - archives at {}", family, root.display()),
            None if family == ModelFamily::Ecmwf && !config.api_base().is_empty() => {
                println!("   {} - SPT API at {}", family, config.api_base())
            }
            None => println!("   {} - not configured", family),
        }
    }
    if !NetCdfOpener::AVAILABLE {
        for family in config.archives.configured_families() {
            println!(
                "   ⚠️  {} archives are configured but this build has no NetCDF support; rebuild with --features netcdf",
                family
            );
        }
    }
    println!();

    let port = config.server.port;
    let workers = config.server.workers;

    let service = match HydroService::from_config(config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            eprintln!("❌ Failed to build API client: {}", e);
            std::process::exit(1);
        }
    };

    println!("🚀 Starting HTTP endpoint server ({} workers)...", workers);
    println!("   Press Ctrl+C to stop\n");

    if let Err(e) = endpoint::start_endpoint_server(service, port, workers) {
        eprintln!("\n❌ Endpoint server error: {}", e);
        std::process::exit(1);
    }
}
