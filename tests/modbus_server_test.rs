// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the HygroModbusServer implementation
//!
//! These tests start a server on an OS assigned port and talk to it with a
//! real Modbus TCP client: register map reads, control commands reaching the
//! alert controller, coils, and the exceptions returned for unsupported
//! functions and out of range addresses.

use std::time::Duration;
use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use rust_hygro_alarm::control::{self, AlertController, AlertMode, SharedAlertController};
use rust_hygro_alarm::modbus::HygroModbusServer;
use rust_hygro_alarm::registers::{RegisterStore, CONTROL_REGISTER};

/// Test utility function to start a Modbus server in the background
async fn start_test_server(
    store: Arc<RegisterStore>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
    // Use port 0 to let the OS assign an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let socket_addr = listener.local_addr()?;

    let server = Server::new(listener);
    let on_connected = move |stream, socket_addr| {
        let store = store.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(HygroModbusServer::new(store.clone())))
            })
        }
    };

    let on_process_error = |err| {
        eprintln!("Server error: {}", err);
    };

    let handle = tokio::spawn(async move {
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            eprintln!("Server error: {}", e);
        }
    });

    Ok((socket_addr, handle))
}

fn controlled_store() -> (Arc<RegisterStore>, SharedAlertController) {
    let store = Arc::new(RegisterStore::new());
    let controller = AlertController::new().into_shared();
    control::attach_to_store(&controller, &store);
    (store, controller)
}

#[tokio::test]
async fn test_unwritten_registers_read_as_zero() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server_handle) = start_test_server(Arc::new(RegisterStore::new())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let data = ctx.read_holding_registers(0, 6).await??;
    assert_eq!(data, vec![0; 6]);

    let data = ctx.read_input_registers(1000, 2).await??;
    assert_eq!(data, vec![0, 0]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_readings_are_served_on_both_tables() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(RegisterStore::new());
    store.holding.set(0, 235)?;
    store.holding.set(2, 410)?;
    store.holding.set(4, 1)?;
    store.coils.set(4, true)?;

    let (socket_addr, _server_handle) = start_test_server(store).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let holding = ctx.read_holding_registers(0, 5).await??;
    let input = ctx.read_input_registers(0, 5).await??;
    assert_eq!(holding, vec![235, 0, 410, 0, 1]);
    assert_eq!(input, holding);

    let coils = ctx.read_coils(4, 1).await??;
    let discrete = ctx.read_discrete_inputs(3, 2).await??;
    assert_eq!(coils, vec![true]);
    assert_eq!(discrete, vec![false, true]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_control_command_reaches_controller() -> Result<(), Box<dyn std::error::Error>> {
    let (store, controller) = controlled_store();
    let (socket_addr, _server_handle) = start_test_server(store.clone()).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_register(CONTROL_REGISTER, 3).await??;
    // The observer runs before the write is acknowledged
    assert_eq!(control::lock(&controller).mode(), AlertMode::ManualActive);

    ctx.write_multiple_registers(CONTROL_REGISTER, &[2, 9]).await??;
    assert_eq!(
        control::lock(&controller).mode(),
        AlertMode::AutoThresholdSuppressed
    );
    assert_eq!(store.holding.peek(CONTROL_REGISTER + 1), 9);

    // Unknown codes are stored but ignored
    ctx.write_single_register(CONTROL_REGISTER, 77).await??;
    assert_eq!(
        control::lock(&controller).mode(),
        AlertMode::AutoThresholdSuppressed
    );
    assert_eq!(control::lock(&controller).last_command(), Some(77));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_writes_outside_control_register_do_not_command(
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, controller) = controlled_store();
    let (socket_addr, _server_handle) = start_test_server(store).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // A batch starting below register 5 is not a command even if it covers it
    ctx.write_multiple_registers(4, &[0, 0]).await??;
    assert_eq!(
        control::lock(&controller).mode(),
        AlertMode::AutoThresholdArmed
    );

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_coil_writes() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server_handle) = start_test_server(Arc::new(RegisterStore::new())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_coil(1, true).await??;
    ctx.write_multiple_coils(2, &[true, false, true]).await??;
    let coils = ctx.read_coils(0, 5).await??;
    assert_eq!(coils, vec![false, true, true, false, true]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_function() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server_handle) = start_test_server(Arc::new(RegisterStore::new())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let result = ctx.read_write_multiple_registers(0, 1, 5, &[1]).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalFunction));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_range_past_address_space() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server_handle) = start_test_server(Arc::new(RegisterStore::new())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let result = ctx.read_holding_registers(u16::MAX, 2).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.write_multiple_registers(u16::MAX, &[1, 2]).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    // The last address itself is valid
    ctx.write_single_register(u16::MAX, 7).await??;
    assert_eq!(ctx.read_holding_registers(u16::MAX, 1).await??, vec![7]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_multiple_clients_share_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let (store, controller) = controlled_store();
    let (socket_addr, _server_handle) = start_test_server(store).await?;

    let mut client1 = tcp::connect(socket_addr).await?;
    let mut client2 = tcp::connect(socket_addr).await?;

    client1.write_single_register(CONTROL_REGISTER, 0).await??;
    time::sleep(Duration::from_millis(50)).await;

    let data = client2.read_holding_registers(CONTROL_REGISTER, 1).await??;
    assert_eq!(data, vec![0]);
    assert_eq!(control::lock(&controller).mode(), AlertMode::Idle);

    client1.disconnect().await?;
    client2.disconnect().await?;
    Ok(())
}
