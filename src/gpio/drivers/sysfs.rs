// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Native GPIO driver using the Linux sysfs interface
//!
//! A line is exported through `<root>/export`, configured through
//! `<root>/gpioN/direction` and sampled through `<root>/gpioN/value`. The value
//! file is kept open for the lifetime of the driver so that the busy-wait loops
//! only pay for a seek and a one byte read or write.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::gpio::{Direction, GpioError, GpioLine, PinState};

/// A GPIO line acquired through sysfs
pub struct SysfsGpioDriver {
    pin: u32,
    root: PathBuf,
    line_dir: PathBuf,
    value: File,
    /// Only lines exported by this driver are unexported on drop
    exported_here: bool,
}

impl SysfsGpioDriver {
    /// Acquire `pin` under the sysfs `root` (usually `/sys/class/gpio`).
    ///
    /// ### Errors
    ///
    /// Returns [`GpioError::HardwareUnavailable`] if the line cannot be exported
    /// or its value file cannot be opened.
    pub fn open<P: AsRef<Path>>(root: P, pin: u32) -> Result<Self, GpioError> {
        let root = root.as_ref().to_path_buf();
        let line_dir = root.join(format!("gpio{}", pin));
        let unavailable = |reason: String| GpioError::HardwareUnavailable { pin, reason };

        let mut exported_here = false;
        if !line_dir.exists() {
            debug!("Exporting GPIO line {} through {:?}", pin, root);
            fs::write(root.join("export"), pin.to_string())
                .map_err(|e| unavailable(format!("export failed: {}", e)))?;
            exported_here = true;
        }

        let value = OpenOptions::new()
            .read(true)
            .write(true)
            .open(line_dir.join("value"))
            .map_err(|e| unavailable(format!("cannot open value file: {}", e)))?;

        Ok(Self {
            pin,
            root,
            line_dir,
            value,
            exported_here,
        })
    }

    fn io_error(&self, source: std::io::Error) -> GpioError {
        GpioError::Io {
            pin: self.pin,
            source,
        }
    }
}

impl GpioLine for SysfsGpioDriver {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), GpioError> {
        let value = match direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        fs::write(self.line_dir.join("direction"), value).map_err(|e| self.io_error(e))
    }

    fn write(&mut self, level: PinState) -> Result<(), GpioError> {
        let byte: &[u8] = match level {
            PinState::High => b"1",
            PinState::Low => b"0",
        };
        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.write_all(byte))
            .map_err(|e| GpioError::Io {
                pin: self.pin,
                source: e,
            })
    }

    fn read(&mut self) -> Result<PinState, GpioError> {
        let mut buf = [0u8; 1];
        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.read_exact(&mut buf))
            .map_err(|e| GpioError::Io {
                pin: self.pin,
                source: e,
            })?;
        Ok(if buf[0] == b'1' {
            PinState::High
        } else {
            PinState::Low
        })
    }
}

impl Drop for SysfsGpioDriver {
    fn drop(&mut self) {
        if !self.exported_here {
            return;
        }
        debug!("Releasing GPIO line {}", self.pin);
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            warn!("Failed to unexport GPIO line {}: {}", self.pin, e);
        }
    }
}
