// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, CONFIG_SCHEMA};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// ### Example
///
/// ```bash
/// ./rust_hygro_alarm --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// ### Validation Rules
///
/// - **Port Range**: the Modbus port is within 1-65534
/// - **IP Address Format**: the Modbus address is checked, a doubtful value only logs a warning
/// - **Pins**: the sensor and alert lines are distinct
/// - **Simulation**: humidity is a percentage and temperature fits the sensor's byte encoding
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.modbus.port < 1 || config.modbus.port > 65534 {
        anyhow::bail!("Invalid Modbus port number: {}", config.modbus.port);
    }

    if !is_valid_ip_address(&config.modbus.address) {
        warn!(
            "Potentially invalid Modbus address format: {}",
            config.modbus.address
        );
    }

    if config.hardware.sensor_pin == config.hardware.alert_pin {
        anyhow::bail!(
            "Sensor and alert must use different pins, both are set to {}",
            config.hardware.sensor_pin
        );
    }

    let humidity = config.simulation.humidity;
    if !(0.0..=100.0).contains(&humidity) {
        anyhow::bail!("Simulated humidity out of range: {}", humidity);
    }
    let temperature = config.simulation.temperature;
    if !(0.0..=255.0).contains(&temperature) {
        anyhow::bail!("Simulated temperature out of range: {}", temperature);
    }

    Ok(())
}
