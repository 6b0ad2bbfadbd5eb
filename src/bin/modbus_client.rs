// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use clap::Parser;
use std::error::Error;
use std::net::SocketAddr;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

use rust_hygro_alarm::registers::{
    ALERT_ACTIVE_REGISTER, CONTROL_REGISTER, HUMIDITY_REGISTER, TEMPERATURE_REGISTER,
};

/// Modbus client for reading and controlling a humidity alarm
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Control command written to register 5 before reading
    /// (0=off once, 1=auto on, 2=auto off, 3=manual on)
    #[clap(long)]
    command: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr: SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    println!("Connecting to Modbus server at {}", socket_addr);

    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    if let Some(command) = args.command {
        println!("Writing command {} to register {}", command, CONTROL_REGISTER);
        ctx.write_single_register(CONTROL_REGISTER, command).await??;
    }

    let response = tokio::time::timeout(
        Duration::from_secs(1),
        ctx.read_holding_registers(TEMPERATURE_REGISTER, CONTROL_REGISTER + 1),
    )
    .await???;

    println!("Raw register values: {:?}", response);

    for (register, value) in (0u16..).zip(response.iter()) {
        match register {
            TEMPERATURE_REGISTER => println!(
                "Register {}: Temperature = {:.1} °C",
                register,
                f32::from(*value) / 10.0
            ),
            HUMIDITY_REGISTER => println!(
                "Register {}: Relative Humidity = {:.1} %",
                register,
                f32::from(*value) / 10.0
            ),
            ALERT_ACTIVE_REGISTER => println!(
                "Register {}: Alert = {}",
                register,
                if *value == 0 { "inactive" } else { "active" }
            ),
            CONTROL_REGISTER => {
                let command = match *value {
                    0 => "off once",
                    1 => "auto on",
                    2 => "auto off",
                    3 => "manual on",
                    _ => "unknown",
                };
                println!("Register {}: Last Command = {} ({})", register, value, command);
            }
            _ => {}
        }
    }

    ctx.disconnect().await?;
    Ok(())
}
