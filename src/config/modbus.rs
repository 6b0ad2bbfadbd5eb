// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration
//!
//! This module defines the structures for configuring the Modbus TCP server
//! through which supervisory systems read the alarm registers.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP server component.
///
/// ### Fields
///
/// * `enabled` - Flag to enable or disable the Modbus server
/// * `port` - TCP port number for the Modbus server (default: 502)
/// * `address` - Network address for the Modbus server to bind to (default: 127.0.0.1)
///
/// ### Example
///
/// ```
/// use rust_hygro_alarm::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     enabled: true,
///     port: 1502,
///     address: "0.0.0.0".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModbusConfig {
    /// Flag to enable or disable the Modbus server.
    ///
    /// The register map is the only client interface of the alarm, so the
    /// server is enabled unless explicitly turned off.
    pub enabled: bool,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Valid range is 1-65534. Default value is 502, which is the standard Modbus TCP port.
    pub port: u16,

    /// The network address the Modbus server will bind to.
    ///
    /// Use "0.0.0.0" to bind to all IPv4 interfaces.
    pub address: String,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 502,
            address: "127.0.0.1".to_string(),
        }
    }
}
