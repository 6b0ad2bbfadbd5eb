// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the humidity alarm service

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio::signal;

use rust_hygro_alarm::config::{self, Config, HardwareDriver};
use rust_hygro_alarm::daemon::launch_daemon::Daemon;

/// Humidity alarm with a Modbus TCP register map
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Modbus enabled
    #[arg(long)]
    modbus_enabled: Option<bool>,

    /// Modbus server address
    #[arg(long)]
    modbus_address: Option<String>,

    /// Modbus server port
    #[arg(long)]
    modbus_port: Option<u16>,

    /// GPIO backend
    #[arg(long, value_enum)]
    driver: Option<HardwareDriver>,

    /// Hygrometer data line number
    #[arg(long)]
    sensor_pin: Option<u32>,

    /// Buzzer line number
    #[arg(long)]
    alert_pin: Option<u32>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.modbus_enabled,
        args.modbus_address.clone(),
        args.modbus_port,
        args.driver,
        args.sensor_pin,
        args.alert_pin,
    );
    config
        .validate()
        .context("Invalid configuration after command line overrides")?;

    info!("Starting humidity alarm daemon");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal, terminating daemon"),
                Err(err) => error!("Error waiting for shutdown signal: {}", err),
            }
        }
        _ = daemon.wait_fatal() => {
            error!("A daemon task failed, terminating");
        }
    }

    daemon.shutdown();
    daemon.join().await
}
