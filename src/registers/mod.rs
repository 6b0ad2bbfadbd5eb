// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sparse register store backing the Modbus server
//!
//! Registers are kept in `HashMap`s keyed by address, so only addresses that
//! were written occupy memory and a read of any other address yields the zero
//! value of the register type.
//!
//! ## Register Map
//!
//! | Address | Description | Scaling | Access |
//! |---------|-------------|---------|--------|
//! | 0 | Temperature | °C ×10 | read |
//! | 2 | Relative humidity | % ×10 | read |
//! | 4 | Alert active flag | 0/1 | read |
//! | 5 | Control command | 0=off once, 1=auto on, 2=auto off, 3=manual on | write |
//!
//! Coil 4 mirrors the alert active flag for clients polling discrete inputs.
//!
//! ## Observers
//!
//! Each bank notifies its observers once per read or write batch, after the
//! batch has been committed and before the call returns. Notifications are
//! delivered while the bank lock is held, so observers see batches in commit
//! order and must never call back into the same bank.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use log::trace;
use thiserror::Error;

/// Temperature register (°C ×10)
pub const TEMPERATURE_REGISTER: u16 = 0;
/// Relative humidity register (% ×10)
pub const HUMIDITY_REGISTER: u16 = 2;
/// Alert active flag register
pub const ALERT_ACTIVE_REGISTER: u16 = 4;
/// Control command register
pub const CONTROL_REGISTER: u16 = 5;

/// Kind of batch reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Errors of the register store
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// The batch runs past the end of the 16 bit address space
    #[error("register range {start}+{count} exceeds the address space")]
    AddressOverflow { start: u16, count: usize },
}

/// Callback fired once per batch with the operation, the start address and
/// the values read or written
pub type Observer<T> = Box<dyn Fn(Operation, u16, &[T]) + Send + Sync>;

/// One table of sparse registers
pub struct RegisterBank<T> {
    cells: Mutex<HashMap<u16, T>>,
    observers: RwLock<Vec<Observer<T>>>,
}

impl<T: Copy + Default> Default for RegisterBank<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> RegisterBank<T> {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
        }
    }

    fn cells(&self) -> MutexGuard<'_, HashMap<u16, T>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer notified after every batch
    pub fn on_operation<F>(&self, observer: F)
    where
        F: Fn(Operation, u16, &[T]) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    /// Read `count` consecutive registers starting at `start`
    pub fn read(&self, start: u16, count: u16) -> Result<Vec<T>, RegisterError> {
        check_range(start, usize::from(count))?;
        let cells = self.cells();
        let values: Vec<T> = (0..count)
            .map(|i| cells.get(&(start + i)).copied().unwrap_or_default())
            .collect();
        trace!("Read {} registers from address {}", count, start);
        self.notify(Operation::Read, start, &values);
        Ok(values)
    }

    /// Write `values` to consecutive registers starting at `start`
    pub fn write(&self, start: u16, values: &[T]) -> Result<(), RegisterError> {
        check_range(start, values.len())?;
        let mut cells = self.cells();
        for (i, value) in values.iter().enumerate() {
            cells.insert(start + i as u16, *value);
        }
        trace!("Wrote {} registers at address {}", values.len(), start);
        self.notify(Operation::Write, start, values);
        Ok(())
    }

    /// Convenience for a single register write
    pub fn set(&self, address: u16, value: T) -> Result<(), RegisterError> {
        self.write(address, std::slice::from_ref(&value))
    }

    /// Current value of one register, without notifying observers
    pub fn peek(&self, address: u16) -> T {
        self.cells().get(&address).copied().unwrap_or_default()
    }

    // Called with the cells lock held
    fn notify(&self, operation: Operation, start: u16, values: &[T]) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(operation, start, values);
        }
    }
}

fn check_range(start: u16, count: usize) -> Result<(), RegisterError> {
    if usize::from(start) + count > usize::from(u16::MAX) + 1 {
        return Err(RegisterError::AddressOverflow { start, count });
    }
    Ok(())
}

/// Register storage shared by the Modbus server and the alarm loops
#[derive(Default)]
pub struct RegisterStore {
    /// Holding and input registers
    pub holding: RegisterBank<u16>,
    /// Coils and discrete inputs
    pub coils: RegisterBank<bool>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }
}
