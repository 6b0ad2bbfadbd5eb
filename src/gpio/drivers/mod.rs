// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! GPIO line drivers
//!
//! - Sysfs: Linux `/sys/class/gpio` lines on a Raspberry Pi class board
//! - Mock: simulation driver for testing and development

pub mod mock;
pub mod sysfs;

pub use mock::{frame_waveform, LevelChange, MockGpioDriver, SimClock, SimDelay};
pub use sysfs::SysfsGpioDriver;
