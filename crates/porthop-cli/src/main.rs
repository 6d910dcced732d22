//! porthop CLI
//!
//! Forward TCP/UDP traffic through a listening port that rotates with a
//! TOTP-derived schedule.

mod config;

use anyhow::Context;
use clap::Parser;
use porthop_core::{HopConfig, Mode, PortSchedule, mask_secret, unix_now};
use porthop_node::{Client, NodeSettings, Server};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use config::{
    Config, DEFAULT_CONFIG_FILE, EXAMPLE_CONFIG_FILE, copy_example_config, find_in, search_dirs,
};

const BANNER: &str = r"
  ___  ___  ___ _____ _  _  ___  ___
 | _ \/ _ \| _ \_   _| || |/ _ \| _ \
 |  _/ (_) |   / | | | __ | (_) |  _/
 |_|  \___/|_|_\ |_| |_||_|\___/|_|
";

/// porthop - forward traffic through a time-rotating port
#[derive(Parser)]
#[command(name = "porthop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Validate the configuration and probe connectivity, then exit
    #[arg(short, long)]
    test: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Where the configuration comes from
enum ConfigSource {
    /// A file to load
    File(PathBuf),
    /// Nothing found; the example was copied into place
    Initialized(PathBuf),
}

/// Locate the config file, seeding it from the example on first run
fn locate_config(requested: &Path) -> anyhow::Result<ConfigSource> {
    if requested.is_file() {
        return Ok(ConfigSource::File(requested.to_path_buf()));
    }
    if requested != Path::new(DEFAULT_CONFIG_FILE) {
        anyhow::bail!("Configuration file {} not found", requested.display());
    }

    let dirs = search_dirs();
    if let Some(found) = find_in(&dirs, DEFAULT_CONFIG_FILE) {
        return Ok(ConfigSource::File(found));
    }

    let target = PathBuf::from(DEFAULT_CONFIG_FILE);
    copy_example_config(Path::new(EXAMPLE_CONFIG_FILE), &target).with_context(|| {
        format!(
            "No {} found in {}",
            DEFAULT_CONFIG_FILE,
            dirs.iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    Ok(ConfigSource::Initialized(target))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    println!("{BANNER}");
    println!("  porthop v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let path = match locate_config(&cli.config)? {
        ConfigSource::File(path) => path,
        ConfigSource::Initialized(path) => {
            println!(
                "Created {} from {}; edit it and run again.",
                path.display(),
                EXAMPLE_CONFIG_FILE
            );
            return Ok(());
        }
    };

    let file = Config::load(&path)?;
    file.validate_log_level()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        file.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = file
        .to_hop_config()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    let settings = file.node_settings()?;

    tracing::info!("Loaded configuration from {}", path.display());
    tracing::info!("Mode: {}, protocol: {}", config.mode, config.protocol);
    tracing::info!("Interval: {}s, extension: {}s", config.interval, config.extend);
    tracing::info!("Port range: {}-{}", config.base_port, config.last_port());

    if cli.test {
        return run_test_mode(config, settings).await;
    }

    match config.mode {
        Mode::Server => run_server(config, settings).await,
        Mode::Client => run_client(config, settings).await,
    }
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                Ok("SIGINT")
            }
            _ = term.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        Ok("Ctrl-C")
    }
}

/// Run the server until a shutdown signal arrives
async fn run_server(config: HopConfig, settings: NodeSettings) -> anyhow::Result<()> {
    tracing::info!("Target service: {}:{}", config.host, config.port);
    let server = Server::new(config, settings)?;

    tokio::select! {
        result = server.start() => result.context("Server failed")?,
        signal = shutdown_signal() => {
            tracing::info!("Received {}, shutting down", signal?);
        }
    }

    server.stop().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Run the client until a shutdown signal arrives
async fn run_client(config: HopConfig, settings: NodeSettings) -> anyhow::Result<()> {
    tracing::info!("Local port: {}, server: {}", config.port, config.host);
    let client = Client::new(config, settings)?;

    tokio::select! {
        result = client.start() => result.context("Client failed")?,
        signal = shutdown_signal() => {
            tracing::info!("Received {}, shutting down", signal?);
        }
    }

    client.stop();
    Ok(())
}

/// Print the current port of every offset
fn print_schedule(schedule: &PortSchedule) {
    let now = unix_now();
    println!("  Ports at {now}:");
    for offset in schedule.offsets() {
        match schedule.port_for(*offset, now) {
            Ok(assignment) => println!(
                "    offset {:+}: port {} (valid {}..{}, {})",
                offset,
                assignment.port,
                assignment.window.valid_start,
                assignment.window.valid_end,
                if assignment.is_active(now) {
                    "active"
                } else {
                    "inactive"
                }
            ),
            Err(e) => println!("    offset {offset:+}: error - {e}"),
        }
    }
}

/// Validate the configuration and probe connectivity once
async fn run_test_mode(config: HopConfig, settings: NodeSettings) -> anyhow::Result<()> {
    println!("=== Test mode ===");
    println!();
    println!("1. Configuration");
    println!("  Mode: {}", config.mode);
    println!("  Protocol: {}", config.protocol);
    println!("  Secret: {}", mask_secret(&config.secret));
    println!("  Base port: {}", config.base_port);
    println!("  Port range: {}", config.port_range);
    println!("  Interval: {}s", config.interval);
    println!("  Extension: {}s", config.extend);
    println!("  Offsets: {:?}", config.offsets);
    println!("  Host: {}", config.host);
    println!("  Port: {}", config.port);
    println!();

    println!("2. Port schedule");
    print_schedule(&config.schedule()?);
    println!();

    match config.mode {
        Mode::Server => {
            println!("3. Target service {}:{}", config.host, config.port);
            let server = Server::new(config, settings)?;
            match server.probe_target().await {
                Ok(outcome) => println!("  OK: {outcome}"),
                Err(e) => println!("  FAILED: {e}"),
            }
        }
        Mode::Client => {
            println!("3. Server {} (local port {})", config.host, config.port);
            let client = Client::new(config, settings)?;
            for candidate in client.server_ports() {
                println!("  candidate {} (offset {:+})", candidate.addr, candidate.offset);
            }
            match client.probe().await {
                Ok(outcome) => println!("  OK: {outcome}"),
                Err(e) => {
                    println!("  FAILED: {e}");
                    println!("  Make sure the server is running with the same secret and schedule");
                }
            }
        }
    }

    println!();
    println!("=== Test complete ===");
    Ok(())
}
