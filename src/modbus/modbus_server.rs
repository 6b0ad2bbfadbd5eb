// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server implementation for the humidity alarm
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! The Modbus master is the device that requests data, while the Modbus slave is the device
//! that provides data. In other words, the Modbus master is here the client and the
//! Modbus slave is here the server.
//!
//! ## Function Codes
//!
//! | Code | Request | Table |
//! |------|---------|-------|
//! | 0x03 / 0x04 | Read holding / input registers | holding |
//! | 0x06 / 0x10 | Write single / multiple registers | holding |
//! | 0x01 / 0x02 | Read coils / discrete inputs | coils |
//! | 0x05 / 0x0F | Write single / multiple coils | coils |
//!
//! Any other function code is answered with `IllegalFunction`.

use std::{future, sync::Arc};

use log::{debug, error};

use tokio_modbus::prelude::*;

use crate::registers::{RegisterError, RegisterStore};

/// A Modbus TCP service exposing the alarm register store.
///
/// One instance is created per client connection; all of them share the same
/// [`RegisterStore`], so a command written by one client is visible to every
/// other client and reaches the alert controller before the write is
/// acknowledged.
pub struct HygroModbusServer {
    store: Arc<RegisterStore>,
}

impl tokio_modbus::server::Service for HygroModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadInputRegisters(addr, cnt) => self
                .store
                .holding
                .read(addr, cnt)
                .map(Response::ReadInputRegisters)
                .map_err(illegal_address),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .store
                .holding
                .read(addr, cnt)
                .map(Response::ReadHoldingRegisters)
                .map_err(illegal_address),
            Request::WriteMultipleRegisters(addr, values) => self
                .store
                .holding
                .write(addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
                .map_err(illegal_address),
            Request::WriteSingleRegister(addr, value) => self
                .store
                .holding
                .set(addr, value)
                .map(|_| Response::WriteSingleRegister(addr, value))
                .map_err(illegal_address),
            Request::ReadCoils(addr, cnt) => self
                .store
                .coils
                .read(addr, cnt)
                .map(Response::ReadCoils)
                .map_err(illegal_address),
            Request::ReadDiscreteInputs(addr, cnt) => self
                .store
                .coils
                .read(addr, cnt)
                .map(Response::ReadDiscreteInputs)
                .map_err(illegal_address),
            Request::WriteSingleCoil(addr, value) => self
                .store
                .coils
                .set(addr, value)
                .map(|_| Response::WriteSingleCoil(addr, value))
                .map_err(illegal_address),
            Request::WriteMultipleCoils(addr, values) => self
                .store
                .coils
                .write(addr, &values)
                .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16))
                .map_err(illegal_address),
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

impl HygroModbusServer {
    /// Create a service backed by the shared register store
    pub fn new(store: Arc<RegisterStore>) -> Self {
        Self { store }
    }
}

fn illegal_address(err: RegisterError) -> ExceptionCode {
    error!("Exception::IllegalDataAddress - {}", err);
    ExceptionCode::IllegalDataAddress
}
