// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the humidity alarm
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings for the alarm service. The configuration is backed
//! by a YAML file and validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `modbus`: Settings for the Modbus TCP server
//! - `hardware`: GPIO driver and pin assignment
//! - `simulation`: Values reported by the simulated hygrometer
//!
//! ## Usage
//!
//! ```no_run
//! use rust_hygro_alarm::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(true),                  // Enable Modbus
//!     Some("0.0.0.0".to_string()), // Modbus address
//!     Some(1502),                  // Modbus port
//!     None,                        // GPIO driver
//!     Some(4),                     // Sensor pin
//!     None,                        // Alert pin
//! );
//!
//! println!("Modbus port: {}", config.modbus.port);
//! ```

pub mod hardware;
pub mod modbus;
pub mod simulation;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use hardware::{HardwareConfig, HardwareDriver};
pub use modbus::ModbusConfig;
pub use simulation::SimulationConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// JSON schema the YAML configuration is validated against
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure for the alarm service.
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Modbus TCP server settings
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// GPIO driver and pins of the sensor and buzzer
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// Readings produced by the `mock` driver
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// A missing file is created with the default configuration. A file that
    /// fails schema validation, deserialization or the additional rules leaves
    /// a `.sample.yaml` with the defaults next to it and yields an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // An empty document is an empty mapping, every section defaulted
        let yaml_value: serde_yml::Value = match serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?
        {
            serde_yml::Value::Null => serde_yml::Value::Mapping(Default::default()),
            value => value,
        };

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_value(yaml_value) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = config.validate() {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Check the rules the JSON schema cannot express.
    ///
    /// Run on every loaded file and again after command line overrides.
    pub fn validate(&self) -> Result<()> {
        utils::validate_specific_rules(self)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only arguments that were provided override the loaded configuration.
    ///
    /// ### Parameters
    ///
    /// * `modbus_enabled` - Optional flag to enable/disable the Modbus server
    /// * `modbus_address` - Optional network address for the Modbus server
    /// * `modbus_port` - Optional TCP port for the Modbus server
    /// * `driver` - Optional GPIO backend
    /// * `sensor_pin` - Optional hygrometer line number
    /// * `alert_pin` - Optional buzzer line number
    pub fn apply_args(
        &mut self,
        modbus_enabled: Option<bool>,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
        driver: Option<HardwareDriver>,
        sensor_pin: Option<u32>,
        alert_pin: Option<u32>,
    ) {
        if let Some(enabled) = modbus_enabled {
            debug!("Overriding Modbus enabled from command line: {}", enabled);
            self.modbus.enabled = enabled;
        }
        if let Some(address) = modbus_address {
            debug!("Overriding Modbus address from command line: {}", address);
            self.modbus.address = address;
        }
        if let Some(port) = modbus_port {
            debug!("Overriding Modbus port from command line: {}", port);
            self.modbus.port = port;
        }

        if let Some(driver) = driver {
            debug!("Overriding GPIO driver from command line: {:?}", driver);
            self.hardware.driver = driver;
        }
        if let Some(pin) = sensor_pin {
            debug!("Overriding sensor pin from command line: {}", pin);
            self.hardware.sensor_pin = pin;
        }
        if let Some(pin) = alert_pin {
            debug!("Overriding alert pin from command line: {}", pin);
            self.hardware.alert_pin = pin;
        }
    }
}
