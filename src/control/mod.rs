// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Alert control state machine
//!
//! The controller owns the [`AlertMode`] and the threshold logic. It learns
//! about client commands through the holding register bank observer (see
//! [`attach_to_store`]) and about humidity through the poll loop calling
//! [`AlertController::observe_reading`] once per successful decode.
//!
//! ## Commands (register 5)
//!
//! | Code | Mode | Side effect |
//! |------|------|-------------|
//! | 0 | Idle | alert line forced off, suppressed until humidity ≤ 40 % |
//! | 1 | AutoThresholdArmed | suppression cleared |
//! | 2 | AutoThresholdSuppressed | alert line forced off, suppressed until humidity ≤ 40 % |
//! | 3 | ManualActive | manual pattern from the next alert cycle |
//!
//! Any other code is ignored.
//!
//! Forcing the line off goes through a [`SilenceSignal`] shared with the
//! pattern generator, which abandons a pattern already in progress.
//!
//! ## Thread Safety
//!
//! The controller is shared as [`SharedAlertController`]. The lock is only ever
//! held for a state read or update; it is never held across a decode or a
//! pulse emission. The register observer takes it while the bank lock is held,
//! so no other path may take the bank lock while holding the controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::registers::{Operation, RegisterStore, CONTROL_REGISTER};
use crate::sensor::SensorReading;

/// Humidity above which the automatic alert fires, in tenths of a percent
pub const HUMIDITY_THRESHOLD_TENTHS: u16 = 400;

/// Alert operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertMode {
    /// Silenced by command 0
    Idle,
    /// Alert follows the humidity threshold
    AutoThresholdArmed,
    /// Automatic alert disabled by command 2
    AutoThresholdSuppressed,
    /// Alert forced on by command 3
    ManualActive,
}

/// Commands accepted on the control register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    OffOnce = 0,
    AutoOn = 1,
    AutoOff = 2,
    ManualOn = 3,
}

impl TryFrom<u16> for ControlCommand {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ControlCommand::OffOnce),
            1 => Ok(ControlCommand::AutoOn),
            2 => Ok(ControlCommand::AutoOff),
            3 => Ok(ControlCommand::ManualOn),
            other => Err(other),
        }
    }
}

/// Counter raised by every command that forces the alert line off.
///
/// Clones share the same counter. A pattern started for a snapshot must stop
/// as soon as the counter moves past the snapshot's `silence_epoch`.
#[derive(Debug, Clone, Default)]
pub struct SilenceSignal(Arc<AtomicU64>);

impl SilenceSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// True if the line was forced off after `epoch` was observed
    pub fn raised_since(&self, epoch: u64) -> bool {
        self.epoch() != epoch
    }

    fn raise(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Consistent view of the controller taken once per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertSnapshot {
    pub mode: AlertMode,
    pub suppressed: bool,
    pub drive_intent: bool,
    pub humidity_tenths: Option<u16>,
    /// [`SilenceSignal`] epoch when the snapshot was taken
    pub silence_epoch: u64,
}

/// Alert control state
#[derive(Debug)]
pub struct AlertController {
    mode: AlertMode,
    /// Blocks automatic re-arming until humidity drops to the threshold
    suppressed: bool,
    drive_intent: bool,
    humidity_tenths: Option<u16>,
    temperature_tenths: Option<u16>,
    /// Shadow of the last value written to the control register
    last_command: Option<u16>,
    last_reading_at: Option<DateTime<Utc>>,
    silence: SilenceSignal,
}

/// Controller shared between the register observer and the alarm loops
pub type SharedAlertController = Arc<Mutex<AlertController>>;

impl Default for AlertController {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertController {
    /// A controller in automatic mode, waiting for its first reading
    pub fn new() -> Self {
        Self {
            mode: AlertMode::AutoThresholdArmed,
            suppressed: false,
            drive_intent: false,
            humidity_tenths: None,
            temperature_tenths: None,
            last_command: None,
            last_reading_at: None,
            silence: SilenceSignal::new(),
        }
    }

    pub fn into_shared(self) -> SharedAlertController {
        Arc::new(Mutex::new(self))
    }

    /// Handle a write batch on the holding registers.
    ///
    /// Only batches starting at the control register are commands; the first
    /// value is the command code.
    pub fn on_register_write(&mut self, start: u16, values: &[u16]) {
        if start != CONTROL_REGISTER {
            return;
        }
        let Some(&code) = values.first() else {
            return;
        };
        self.last_command = Some(code);

        match ControlCommand::try_from(code) {
            Ok(command) => self.apply(command),
            Err(code) => debug!("Ignoring unknown control command {}", code),
        }
    }

    /// Apply a control command
    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::OffOnce => {
                self.mode = AlertMode::Idle;
                self.suppressed = true;
                self.drive_intent = false;
                self.silence.raise();
            }
            ControlCommand::AutoOn => {
                self.mode = AlertMode::AutoThresholdArmed;
                self.suppressed = false;
            }
            ControlCommand::AutoOff => {
                self.mode = AlertMode::AutoThresholdSuppressed;
                self.suppressed = true;
                self.drive_intent = false;
                self.silence.raise();
            }
            ControlCommand::ManualOn => {
                self.mode = AlertMode::ManualActive;
            }
        }
        info!("Control command {:?}: alert mode is now {:?}", command, self.mode);
    }

    /// Feed a decoded reading into the threshold logic.
    ///
    /// Returns the new drive intent.
    pub fn observe_reading(&mut self, reading: &SensorReading) -> bool {
        self.temperature_tenths = Some(reading.temperature_tenths());
        self.last_reading_at = Some(Utc::now());
        self.observe_humidity(reading.humidity_tenths())
    }

    /// Re-derive the drive intent from a humidity sample, once per poll cycle.
    ///
    /// A sample at or below the threshold lifts the suppression left by
    /// command 0 or 2 and re-arms the automatic mode.
    pub fn observe_humidity(&mut self, humidity_tenths: u16) -> bool {
        self.humidity_tenths = Some(humidity_tenths);

        if humidity_tenths <= HUMIDITY_THRESHOLD_TENTHS && self.suppressed {
            self.suppressed = false;
            if matches!(
                self.mode,
                AlertMode::Idle | AlertMode::AutoThresholdSuppressed
            ) {
                self.mode = AlertMode::AutoThresholdArmed;
                info!(
                    "Humidity back to {:.1} %, automatic alert re-armed",
                    f32::from(humidity_tenths) / 10.0
                );
            }
        }

        self.drive_intent =
            self.mode == AlertMode::AutoThresholdArmed && humidity_tenths > HUMIDITY_THRESHOLD_TENTHS;
        self.drive_intent
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        AlertSnapshot {
            mode: self.mode,
            suppressed: self.suppressed,
            drive_intent: self.drive_intent,
            humidity_tenths: self.humidity_tenths,
            silence_epoch: self.silence.epoch(),
        }
    }

    /// Signal raised whenever a command forces the alert line off
    pub fn silence_signal(&self) -> SilenceSignal {
        self.silence.clone()
    }

    pub fn mode(&self) -> AlertMode {
        self.mode
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn drive_intent(&self) -> bool {
        self.drive_intent
    }

    pub fn last_command(&self) -> Option<u16> {
        self.last_command
    }

    pub fn temperature_tenths(&self) -> Option<u16> {
        self.temperature_tenths
    }

    pub fn last_reading_at(&self) -> Option<DateTime<Utc>> {
        self.last_reading_at
    }
}

/// Lock a shared controller, recovering the state if a holder panicked
pub fn lock(controller: &SharedAlertController) -> MutexGuard<'_, AlertController> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Route holding register writes to the controller
pub fn attach_to_store(controller: &SharedAlertController, store: &RegisterStore) {
    let controller = controller.clone();
    store.holding.on_operation(move |operation, start, values| {
        if operation == Operation::Write {
            lock(&controller).on_register_write(start, values);
        }
    });
}
