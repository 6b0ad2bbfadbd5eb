// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the Modbus TCP service through which a supervisory
//! system reads temperature, humidity and alert status, and controls the alert
//! by writing commands to the control register.
//!
//! ## Usage
//!
//! The Modbus server is started as part of the application daemon:
//!
//! ```no_run
//! use rust_hygro_alarm::config::Config;
//! use rust_hygro_alarm::daemon::launch_daemon::Daemon;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mut daemon = Daemon::new();
//! daemon.launch(&config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Register Map
//!
//! - Register 0: Temperature (°C × 10)
//! - Register 2: Relative humidity (% × 10)
//! - Register 4: Alert active flag (0/1), mirrored on coil 4
//! - Register 5: Control command (0=off once, 1=auto on, 2=auto off, 3=manual on)

pub mod modbus_server;
pub use modbus_server::HygroModbusServer;
