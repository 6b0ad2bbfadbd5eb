// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Buzzer pulse patterns
//!
//! The buzzer is a passive element: a tone is produced by toggling the alert
//! line every half period for the duration of a pulse. Which pattern plays is
//! decided from an [`AlertSnapshot`] once per alert cycle:
//!
//! | Condition | Pattern |
//! |-----------|---------|
//! | Manual mode | 2 × 100 ms at 440 Hz, 200 ms apart |
//! | Drive intent | 1 × 100 ms at 880 Hz |
//! | Otherwise | line held low |

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};
use serde::Serialize;

use crate::control::{AlertMode, AlertSnapshot, SilenceSignal};
use crate::gpio::{Direction, GpioError, GpioLine, PinState};

/// Period of the alert loop
pub const ALERT_CYCLE_PERIOD: Duration = Duration::from_secs(1);

/// Tone of the manual pattern
pub const MANUAL_TONE_HZ: u32 = 440;
/// Tone of the automatic threshold pattern
pub const AUTO_TONE_HZ: u32 = 880;
/// Duration of one pulse
pub const PULSE_MS: u32 = 100;
/// Silence between two pulses of the same pattern
pub const PULSE_PAUSE_MS: u32 = 200;

/// A train of tone pulses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePattern {
    pulses: usize,
    tone_hz: u32,
    pulse_ms: u32,
    pause_ms: u32,
}

impl PulsePattern {
    pub const MANUAL: PulsePattern = PulsePattern {
        pulses: 2,
        tone_hz: MANUAL_TONE_HZ,
        pulse_ms: PULSE_MS,
        pause_ms: PULSE_PAUSE_MS,
    };

    pub const AUTOMATIC: PulsePattern = PulsePattern {
        pulses: 1,
        tone_hz: AUTO_TONE_HZ,
        pulse_ms: PULSE_MS,
        pause_ms: PULSE_PAUSE_MS,
    };

    /// Pattern to play for a controller snapshot, if any
    pub fn for_snapshot(snapshot: &AlertSnapshot) -> Option<PulsePattern> {
        if snapshot.mode == AlertMode::ManualActive {
            Some(Self::MANUAL)
        } else if snapshot.drive_intent {
            Some(Self::AUTOMATIC)
        } else {
            None
        }
    }
}

/// Physical output intent derived by one alert cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertDriveState {
    pub is_active: bool,
}

/// Drives the buzzer line
pub struct AlertPatternGenerator<L: GpioLine, D> {
    line: L,
    delay: D,
    silence: SilenceSignal,
}

impl<L: GpioLine, D: DelayNs> AlertPatternGenerator<L, D> {
    /// Take ownership of the alert line, configured as a low output.
    ///
    /// `silence` is the controller's [`SilenceSignal`]; raising it stops a
    /// pattern in progress.
    pub fn new(mut line: L, delay: D, silence: SilenceSignal) -> Result<Self, GpioError> {
        line.set_direction(Direction::Output)?;
        line.write(PinState::Low)?;
        Ok(Self {
            line,
            delay,
            silence,
        })
    }

    /// Run one alert cycle for `snapshot`.
    ///
    /// Blocks for the duration of the pattern (up to 400 ms). A command that
    /// forces the alert off while the pattern plays drives the line low at
    /// once and the cycle reports an inactive alert. Line failures are
    /// returned to the caller, which treats them as fatal.
    pub fn run_cycle(&mut self, snapshot: &AlertSnapshot) -> Result<AlertDriveState, GpioError> {
        match PulsePattern::for_snapshot(snapshot) {
            Some(pattern) => {
                trace!("Playing {:?}", pattern);
                let completed = self.play(&pattern, snapshot.silence_epoch)?;
                if !completed {
                    debug!("Alert pattern cut short on pin {}", self.line.pin());
                }
                Ok(AlertDriveState {
                    is_active: completed,
                })
            }
            None => {
                self.line.write(PinState::Low)?;
                Ok(AlertDriveState { is_active: false })
            }
        }
    }

    /// Play every pulse of `pattern`, pausing only between pulses.
    ///
    /// Returns `false`, with the line low, if the silence signal moved past
    /// `silence_epoch` before the pattern finished.
    pub fn play(
        &mut self,
        pattern: &PulsePattern,
        silence_epoch: u64,
    ) -> Result<bool, GpioError> {
        for pulse in 0..pattern.pulses {
            if pulse > 0 && !self.pause(pattern.pause_ms, silence_epoch) {
                return Ok(false);
            }
            if !self.tone(pattern.tone_hz, pattern.pulse_ms, silence_epoch)? {
                return Ok(false);
            }
        }
        Ok(!self.silence.raised_since(silence_epoch))
    }

    /// Keep the line low for `duration_ms`, one millisecond at a time
    fn pause(&mut self, duration_ms: u32, silence_epoch: u64) -> bool {
        for _ in 0..duration_ms {
            if self.silence.raised_since(silence_epoch) {
                return false;
            }
            self.delay.delay_ms(1);
        }
        !self.silence.raised_since(silence_epoch)
    }

    /// Square wave at `tone_hz` for exactly `duration_ms`, ending low.
    ///
    /// Returns `false` if the silence signal cut the tone short.
    fn tone(
        &mut self,
        tone_hz: u32,
        duration_ms: u32,
        silence_epoch: u64,
    ) -> Result<bool, GpioError> {
        let half_period_us = (1_000_000 / tone_hz.max(1).saturating_mul(2)).max(1);
        let duration_us = duration_ms.saturating_mul(1_000);
        let toggles = duration_us / half_period_us;

        let mut level = PinState::High;
        for _ in 0..toggles {
            if self.silence.raised_since(silence_epoch) {
                self.line.write(PinState::Low)?;
                return Ok(false);
            }
            self.line.write(level)?;
            self.delay.delay_us(half_period_us);
            level = !level;
        }
        self.delay.delay_us(duration_us - toggles * half_period_us);
        self.line.write(PinState::Low)?;
        Ok(true)
    }
}

impl<L: GpioLine, D> Drop for AlertPatternGenerator<L, D> {
    fn drop(&mut self) {
        if let Err(e) = self.line.write(PinState::Low) {
            warn!("Could not silence alert line {}: {}", self.line.pin(), e);
        }
    }
}
