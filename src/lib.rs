// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Humidity alarm library
//!
//! Reads a single-wire hygrometer, sounds a buzzer when relative humidity
//! exceeds 40 %, and exposes readings and alert control through a Modbus TCP
//! register map.

pub mod alert;
pub mod config;
pub mod control;
pub mod daemon;
pub mod gpio;
pub mod modbus;
pub mod registers;
pub mod sensor;
