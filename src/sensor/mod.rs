// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Single-wire hygrometer support
//!
//! The sensor answers a host start signal with a 40 bit frame: humidity integer
//! and fractional bytes, temperature integer and fractional bytes, then a
//! checksum equal to the low 8 bits of the sum of the first four bytes. Bits are
//! encoded by the duration of high runs, which the host measures by busy-waiting.
//!
//! ```text
//!  host start        ack         bit 0        bit 1
//! ──┐        ┌──┐      ┌────┐      ┌──┐      ┌──────┐
//!   │ 18 ms  │40│      │    │      │  │      │      │
//!   └────────┘  └──────┘    └──────┘  └──────┘      └─ ...
//! ```

pub mod decoder;

use serde::Serialize;
use thiserror::Error;

use crate::gpio::GpioError;

pub use decoder::{BitAccumulator, SensorDecoder};

/// Duration the host holds the line low to wake the sensor
pub const START_SIGNAL_LOW_MS: u32 = 18;
/// Duration the host holds the line high before releasing it
pub const START_SIGNAL_HIGH_US: u32 = 40;
/// Level-transition windows sampled per read
pub const MAX_WINDOWS: usize = 85;
/// Windows belonging to the sensor handshake
pub const HANDSHAKE_WINDOWS: usize = 4;
/// Micro-ticks without a transition after which a read times out
pub const MAX_WINDOW_TICKS: u32 = 255;
/// High runs longer than this many micro-ticks encode a one
pub const ONE_BIT_THRESHOLD_TICKS: u32 = 16;
/// Bits in a complete frame
pub const FRAME_BITS: usize = 40;

/// Errors of a single read cycle
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Fewer than 40 bits arrived before the line stopped toggling
    #[error("sensor read timed out after {bits} bits")]
    Timeout { bits: usize },

    /// The frame arrived but its checksum does not match
    #[error("checksum mismatch: expected {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },

    /// The data line itself failed; not recoverable by retrying
    #[error("sensor line failure: {0}")]
    Line(#[from] GpioError),
}

impl DecodeError {
    /// Whether the poll loop can simply retry on its next tick
    pub fn is_transient(&self) -> bool {
        !matches!(self, DecodeError::Line(_))
    }
}

/// A decoded sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub humidity_int: u8,
    pub humidity_frac: u8,
    pub temperature_int: u8,
    pub temperature_frac: u8,
    pub checksum_valid: bool,
}

impl SensorReading {
    /// Build a reading from the five raw frame bytes
    pub fn from_frame(frame: [u8; 5]) -> Self {
        Self {
            humidity_int: frame[0],
            humidity_frac: frame[1],
            temperature_int: frame[2],
            temperature_frac: frame[3],
            checksum_valid: checksum(&frame[..4]) == frame[4],
        }
    }

    /// Relative humidity in tenths of a percent (register encoding)
    pub fn humidity_tenths(&self) -> u16 {
        tenths(self.humidity_int, self.humidity_frac)
    }

    /// Temperature in tenths of a degree Celsius (register encoding)
    pub fn temperature_tenths(&self) -> u16 {
        tenths(self.temperature_int, self.temperature_frac)
    }
}

fn tenths(int: u8, frac: u8) -> u16 {
    u16::from(int) * 10 + u16::from(frac)
}

/// Low 8 bits of the sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}
