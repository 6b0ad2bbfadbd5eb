// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! The daemon module runs and manages the background services of the humidity
//! alarm: the Modbus TCP server, the sensor poll loop, the alert pattern loop
//! and a heartbeat monitor.
//!
//! The sensor and alert loops call into blocking, busy-waiting code through
//! `spawn_blocking`, so the async runtime keeps serving Modbus clients while a
//! frame is decoded or a tone is played. A line failure in either loop stops
//! the whole daemon and wakes [`launch_daemon::Daemon::wait_fatal`].
//!
//! ## Usage
//!
//! ```no_run
//! use rust_hygro_alarm::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     // Create and launch daemon
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Wait for shutdown signal (e.g., Ctrl+C) or a fatal loop error
//!     tokio::select! {
//!         _ = tokio::signal::ctrl_c() => {}
//!         _ = daemon.wait_fatal() => {}
//!     }
//!
//!     // Clean shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;
