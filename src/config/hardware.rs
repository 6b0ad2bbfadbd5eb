// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! GPIO hardware configuration

use serde::{Deserialize, Serialize};

/// Backend used to drive the sensor and alert lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HardwareDriver {
    /// Linux sysfs GPIO interface
    Sysfs,
    /// In-memory lines with a simulated hygrometer
    Mock,
}

/// Pin assignment and driver selection.
///
/// ### Example
///
/// ```
/// use rust_hygro_alarm::config::{HardwareConfig, HardwareDriver};
///
/// let hardware = HardwareConfig {
///     driver: HardwareDriver::Sysfs,
///     sensor_pin: 4,
///     alert_pin: 17,
///     sysfs_path: "/sys/class/gpio".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardwareConfig {
    /// GPIO backend. Defaults to `mock` so the service runs without hardware.
    pub driver: HardwareDriver,

    /// Line number of the hygrometer data pin
    pub sensor_pin: u32,

    /// Line number of the buzzer pin
    pub alert_pin: u32,

    /// Root of the sysfs GPIO tree, only used by the `sysfs` driver
    pub sysfs_path: String,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: HardwareDriver::Mock,
            sensor_pin: 4,
            alert_pin: 17,
            sysfs_path: "/sys/class/gpio".to_string(),
        }
    }
}
