// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bit-banged decoder for the hygrometer protocol
//!
//! The decoder is synchronous on purpose: the whole exchange is timed by
//! busy-waiting on the [`DelayNs`] provider and must not be preempted by an
//! async executor. The daemon runs it on a blocking thread.

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::gpio::{Direction, GpioError, GpioLine, PinState};

use super::{
    checksum, DecodeError, SensorReading, FRAME_BITS, HANDSHAKE_WINDOWS, MAX_WINDOWS,
    MAX_WINDOW_TICKS, ONE_BIT_THRESHOLD_TICKS, START_SIGNAL_HIGH_US, START_SIGNAL_LOW_MS,
};

/// Accumulates decoded bits into the five byte frame, MSB first
#[derive(Debug, Default, Clone)]
pub struct BitAccumulator {
    bytes: [u8; 5],
    bits: usize,
}

impl BitAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift one bit into the frame. Bits past the 40th are dropped.
    pub fn push(&mut self, bit: bool) {
        if self.bits >= FRAME_BITS {
            return;
        }
        let byte = &mut self.bytes[self.bits / 8];
        *byte = (*byte << 1) | u8::from(bit);
        self.bits += 1;
    }

    /// Classify a high run measured in micro-ticks and shift the resulting bit
    pub fn push_high_run(&mut self, ticks: u32) {
        self.push(ticks > ONE_BIT_THRESHOLD_TICKS);
    }

    /// Number of bits collected so far
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Raw frame bytes collected so far
    pub fn frame(&self) -> [u8; 5] {
        self.bytes
    }

    /// Validate the collected frame.
    ///
    /// ### Errors
    ///
    /// - [`DecodeError::Timeout`] if fewer than 40 bits were collected
    /// - [`DecodeError::ChecksumMismatch`] if the fifth byte is not the checksum
    ///   of the first four
    pub fn finish(&self) -> Result<SensorReading, DecodeError> {
        if self.bits < FRAME_BITS {
            return Err(DecodeError::Timeout { bits: self.bits });
        }
        let expected = checksum(&self.bytes[..4]);
        if expected != self.bytes[4] {
            return Err(DecodeError::ChecksumMismatch {
                expected,
                received: self.bytes[4],
            });
        }
        Ok(SensorReading::from_frame(self.bytes))
    }
}

/// Hygrometer attached to a data line
pub struct SensorDecoder<L, D> {
    line: L,
    delay: D,
}

impl<L: GpioLine, D: DelayNs> SensorDecoder<L, D> {
    pub fn new(line: L, delay: D) -> Self {
        Self { line, delay }
    }

    /// Run one complete read cycle.
    ///
    /// Not preemptible: the call returns only once the frame is complete or the
    /// line has been idle for [`MAX_WINDOW_TICKS`] micro-ticks.
    pub fn read_sensor(&mut self) -> Result<SensorReading, DecodeError> {
        self.send_start_signal()?;

        let mut accumulator = BitAccumulator::new();
        let mut last = PinState::High;
        for window in 0..MAX_WINDOWS {
            let Some((ticks, level)) = self.measure_run(last)? else {
                trace!(
                    "Line idle in window {} after {} bits",
                    window,
                    accumulator.bits()
                );
                break;
            };
            last = level;

            if window >= HANDSHAKE_WINDOWS && window % 2 == 0 {
                accumulator.push_high_run(ticks);
            }
        }

        accumulator.finish()
    }

    /// Pull the line low to wake the sensor, then release it
    fn send_start_signal(&mut self) -> Result<(), GpioError> {
        self.line.set_direction(Direction::Output)?;
        self.line.write(PinState::Low)?;
        self.delay.delay_ms(START_SIGNAL_LOW_MS);

        self.line.write(PinState::High)?;
        self.delay.delay_us(START_SIGNAL_HIGH_US);
        self.line.set_direction(Direction::Input)
    }

    /// Count micro-ticks while the line stays at `level`.
    ///
    /// Returns the run length and the new level, or `None` when the run reaches
    /// [`MAX_WINDOW_TICKS`].
    fn measure_run(&mut self, level: PinState) -> Result<Option<(u32, PinState)>, GpioError> {
        let mut ticks = 0;
        loop {
            let sample = self.line.read()?;
            if sample != level {
                return Ok(Some((ticks, sample)));
            }
            ticks += 1;
            if ticks >= MAX_WINDOW_TICKS {
                return Ok(None);
            }
            self.delay.delay_us(1);
        }
    }
}
