// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! GPIO line abstraction
//!
//! The alarm only ever touches two physical lines: the bidirectional data line
//! of the hygrometer and the output line of the buzzer. This module provides the
//! minimal capability set both need (direction switch, digital write, digital
//! read) and the drivers implementing it:
//!
//! - Sysfs: Linux `/sys/class/gpio` interface
//! - Mock: in-memory line for tests and hardware-less simulation
//!
//! Microsecond timing goes through [`embedded_hal::delay::DelayNs`] so that the
//! busy-wait loops of the sensor protocol and the buzzer square wave can run on
//! a simulated clock in tests.

pub mod drivers;

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use log::{debug, info};
use thiserror::Error;

use crate::config::{HardwareConfig, HardwareDriver, SimulationConfig};

pub use embedded_hal::digital::PinState;

/// Direction of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Errors raised by GPIO drivers
#[derive(Error, Debug)]
pub enum GpioError {
    /// The line could not be acquired. Fatal at startup.
    #[error("GPIO line {pin} unavailable: {reason}")]
    HardwareUnavailable { pin: u32, reason: String },

    /// An acquired line failed during a read or write.
    #[error("I/O failure on GPIO line {pin}: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
}

/// A single digital line.
///
/// Every call is a direct, unbuffered hardware access. Implementations release
/// the underlying line when dropped.
#[cfg_attr(test, mockall::automock)]
pub trait GpioLine: Send {
    /// Line (pin) number
    fn pin(&self) -> u32;

    /// Switch the line between input and output
    fn set_direction(&mut self, direction: Direction) -> Result<(), GpioError>;

    /// Drive the line to `level`
    fn write(&mut self, level: PinState) -> Result<(), GpioError>;

    /// Sample the current level of the line
    fn read(&mut self) -> Result<PinState, GpioError>;
}

impl<T: GpioLine + ?Sized> GpioLine for Box<T> {
    fn pin(&self) -> u32 {
        (**self).pin()
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), GpioError> {
        (**self).set_direction(direction)
    }

    fn write(&mut self, level: PinState) -> Result<(), GpioError> {
        (**self).write(level)
    }

    fn read(&mut self) -> Result<PinState, GpioError> {
        (**self).read()
    }
}

/// Monotonic spin-wait delay.
///
/// Spins on [`Instant`] instead of sleeping, the scheduler granularity being far
/// too coarse for the sensor protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let deadline = Instant::now() + Duration::from_nanos(u64::from(ns));
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// The two lines used by the alarm, acquired together.
pub struct AlarmLines {
    pub sensor: Box<dyn GpioLine>,
    pub alert: Box<dyn GpioLine>,
}

/// Acquire the sensor and alert lines described by the hardware configuration.
///
/// Acquisition is all-or-nothing: if the alert line fails, the already acquired
/// sensor line is released before the error is returned.
///
/// ### Errors
///
/// Returns [`GpioError::HardwareUnavailable`] if either line cannot be acquired.
pub fn open_alarm_lines(
    hardware: &HardwareConfig,
    simulation: &SimulationConfig,
) -> Result<AlarmLines, GpioError> {
    info!(
        "Acquiring GPIO lines (driver: {:?}, sensor: {}, alert: {})",
        hardware.driver, hardware.sensor_pin, hardware.alert_pin
    );

    match hardware.driver {
        HardwareDriver::Sysfs => {
            let sensor = drivers::SysfsGpioDriver::open(&hardware.sysfs_path, hardware.sensor_pin)?;
            let alert = drivers::SysfsGpioDriver::open(&hardware.sysfs_path, hardware.alert_pin)?;
            Ok(AlarmLines {
                sensor: Box::new(sensor),
                alert: Box::new(alert),
            })
        }
        HardwareDriver::Mock => {
            let clock = drivers::SimClock::new();
            let sensor = drivers::MockGpioDriver::new(hardware.sensor_pin, clock.clone());
            sensor.respond_with(simulation.frame());
            debug!(
                "Simulated hygrometer reports {:.1} % RH, {:.1} °C",
                simulation.humidity, simulation.temperature
            );
            let alert = drivers::MockGpioDriver::new(hardware.alert_pin, clock);
            Ok(AlarmLines {
                sensor: Box::new(sensor),
                alert: Box::new(alert),
            })
        }
    }
}
