// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated hygrometer configuration
//!
//! With the `mock` hardware driver, the sensor line answers every start signal
//! with a frame built from these values.

use serde::{Deserialize, Serialize};

use crate::sensor::checksum;

/// Values reported by the simulated hygrometer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Relative humidity in percent (0-100)
    pub humidity: f32,

    /// Temperature in degrees Celsius (0-255)
    pub temperature: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            humidity: 45.0,
            temperature: 23.5,
        }
    }
}

impl SimulationConfig {
    /// Sensor frame encoding the configured values, checksum included
    pub fn frame(&self) -> [u8; 5] {
        let (humidity_int, humidity_frac) = split_tenths(self.humidity);
        let (temperature_int, temperature_frac) = split_tenths(self.temperature);
        let data = [humidity_int, humidity_frac, temperature_int, temperature_frac];
        [data[0], data[1], data[2], data[3], checksum(&data)]
    }
}

// Values outside 0.0..=255.9 saturate
fn split_tenths(value: f32) -> (u8, u8) {
    let tenths = (value * 10.0).round().clamp(0.0, 2559.0) as u16;
    ((tenths / 10) as u8, (tenths % 10) as u8)
}
