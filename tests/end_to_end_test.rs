// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end behaviour of the alarm
//!
//! The first group of tests wires the decoder, the controller, the register
//! store and the pattern generator together on mock lines and a simulated
//! clock, one poll or alert cycle at a time. The last test runs the complete
//! daemon with the mock driver and talks to it over Modbus TCP.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep, Instant};
use tokio_modbus::client::{tcp::connect, Reader, Writer};

use rust_hygro_alarm::alert::AlertPatternGenerator;
use rust_hygro_alarm::config::{Config, HardwareDriver};
use rust_hygro_alarm::control::{self, AlertController, AlertMode, SharedAlertController};
use rust_hygro_alarm::daemon::launch_daemon::Daemon;
use rust_hygro_alarm::gpio::drivers::{LevelChange, MockGpioDriver, SimClock, SimDelay};
use rust_hygro_alarm::gpio::PinState;
use rust_hygro_alarm::registers::{
    RegisterStore, ALERT_ACTIVE_REGISTER, CONTROL_REGISTER, HUMIDITY_REGISTER,
    TEMPERATURE_REGISTER,
};
use rust_hygro_alarm::sensor::{checksum, DecodeError, SensorDecoder};

const MS: u64 = 1_000_000;

/// Decoder, controller, store and pattern generator on mock lines
struct Bench {
    decoder: SensorDecoder<MockGpioDriver, SimDelay>,
    sensor: MockGpioDriver,
    generator: AlertPatternGenerator<MockGpioDriver, SimDelay>,
    buzzer: MockGpioDriver,
    clock: SimClock,
    controller: SharedAlertController,
    store: RegisterStore,
}

impl Bench {
    fn new() -> Self {
        let clock = SimClock::new();
        let sensor = MockGpioDriver::new(4, clock.clone());
        let buzzer = MockGpioDriver::new(17, clock.clone());
        let decoder = SensorDecoder::new(sensor.clone(), SimDelay::new(clock.clone()));
        let controller = AlertController::new();
        let generator = AlertPatternGenerator::new(
            buzzer.clone(),
            SimDelay::new(clock.clone()),
            controller.silence_signal(),
        )
        .unwrap();
        let controller = controller.into_shared();
        let store = RegisterStore::new();
        control::attach_to_store(&controller, &store);
        buzzer.clear_writes();

        Self {
            decoder,
            sensor,
            generator,
            buzzer,
            clock,
            controller,
            store,
        }
    }

    /// One poll cycle with the sensor answering `humidity`/`temperature`
    fn poll(&mut self, humidity: (u8, u8), temperature: (u8, u8)) -> Result<(), DecodeError> {
        let data = [humidity.0, humidity.1, temperature.0, temperature.1];
        self.sensor
            .queue_frame([data[0], data[1], data[2], data[3], checksum(&data)]);
        let reading = self.decoder.read_sensor()?;

        control::lock(&self.controller).observe_reading(&reading);
        self.store
            .holding
            .set(TEMPERATURE_REGISTER, reading.temperature_tenths())
            .unwrap();
        self.store
            .holding
            .set(HUMIDITY_REGISTER, reading.humidity_tenths())
            .unwrap();
        Ok(())
    }

    /// One alert cycle; returns the writes it produced on the buzzer line
    fn alert_cycle(&mut self) -> Vec<LevelChange> {
        self.buzzer.clear_writes();
        let snapshot = control::lock(&self.controller).snapshot();
        let state = self.generator.run_cycle(&snapshot).unwrap();
        self.store
            .holding
            .set(ALERT_ACTIVE_REGISTER, u16::from(state.is_active))
            .unwrap();
        self.buzzer.writes()
    }

    fn command(&self, code: u16) {
        self.store.holding.set(CONTROL_REGISTER, code).unwrap();
    }

    fn alert_register(&self) -> u16 {
        self.store.holding.peek(ALERT_ACTIVE_REGISTER)
    }

    fn mode(&self) -> AlertMode {
        control::lock(&self.controller).mode()
    }
}

#[test]
fn test_decoded_frame_lands_in_registers() {
    let mut bench = Bench::new();

    bench.poll((41, 0), (23, 5)).unwrap();

    assert_eq!(bench.store.holding.peek(TEMPERATURE_REGISTER), 235);
    assert_eq!(bench.store.holding.peek(HUMIDITY_REGISTER), 410);
}

#[test]
fn test_failed_read_keeps_previous_values() {
    let mut bench = Bench::new();
    bench.poll((41, 0), (23, 5)).unwrap();

    // Corrupted checksum
    bench.sensor.queue_frame([50, 0, 20, 0, 0]);
    assert!(matches!(
        bench.decoder.read_sensor(),
        Err(DecodeError::ChecksumMismatch { .. })
    ));
    // Sensor absent
    assert!(matches!(
        bench.decoder.read_sensor(),
        Err(DecodeError::Timeout { bits: 0 })
    ));

    assert_eq!(bench.store.holding.peek(TEMPERATURE_REGISTER), 235);
    assert_eq!(bench.store.holding.peek(HUMIDITY_REGISTER), 410);
}

#[test]
fn test_humidity_threshold_drives_alert_register() {
    let mut bench = Bench::new();

    bench.poll((45, 0), (23, 5)).unwrap();
    let writes = bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);
    assert!(writes.iter().any(|w| w.level == PinState::High));

    bench.poll((35, 0), (23, 5)).unwrap();
    let writes = bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);
    assert!(writes.iter().all(|w| w.level == PinState::Low));
}

#[test]
fn test_off_once_silences_next_cycle() {
    let mut bench = Bench::new();
    bench.poll((45, 0), (23, 5)).unwrap();
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);

    bench.command(0);
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);
    assert_eq!(bench.mode(), AlertMode::Idle);

    // Still humid: stays silent until a dip
    bench.poll((46, 0), (23, 5)).unwrap();
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);

    bench.poll((39, 0), (23, 5)).unwrap();
    bench.poll((42, 0), (23, 5)).unwrap();
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);
}

#[test]
fn test_off_once_stops_manual_alert() {
    let mut bench = Bench::new();
    bench.poll((30, 0), (23, 5)).unwrap();

    bench.command(3);
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);

    bench.command(0);
    assert_eq!(bench.mode(), AlertMode::Idle);
    let writes = bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);
    assert!(writes.iter().all(|w| w.level == PinState::Low));
    assert_eq!(bench.buzzer.output_level(), PinState::Low);

    // Dry air after off once re-arms the automatic mode, not the manual one
    bench.poll((30, 0), (23, 5)).unwrap();
    assert_eq!(bench.mode(), AlertMode::AutoThresholdArmed);
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);
}

#[test]
fn test_off_once_from_suppressed_mode() {
    let mut bench = Bench::new();
    bench.poll((45, 0), (23, 5)).unwrap();
    bench.command(2);
    bench.alert_cycle();
    assert_eq!(bench.mode(), AlertMode::AutoThresholdSuppressed);

    bench.command(0);
    assert_eq!(bench.mode(), AlertMode::Idle);
    bench.poll((45, 0), (23, 5)).unwrap();
    let writes = bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);
    assert!(writes.iter().all(|w| w.level == PinState::Low));
}

#[test]
fn test_auto_off_stops_manual_alert() {
    let mut bench = Bench::new();
    bench.poll((45, 0), (23, 5)).unwrap();
    bench.command(3);
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);

    bench.command(2);
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);
    assert_eq!(bench.mode(), AlertMode::AutoThresholdSuppressed);
}

#[test]
fn test_auto_off_waits_for_dip() {
    let mut bench = Bench::new();
    bench.poll((45, 0), (23, 5)).unwrap();

    bench.command(2);
    for _ in 0..3 {
        bench.poll((45, 0), (23, 5)).unwrap();
        bench.alert_cycle();
        assert_eq!(bench.alert_register(), 0);
        assert_eq!(bench.mode(), AlertMode::AutoThresholdSuppressed);
    }

    bench.poll((40, 0), (23, 5)).unwrap();
    assert_eq!(bench.mode(), AlertMode::AutoThresholdArmed);
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 0);

    bench.poll((40, 1), (23, 5)).unwrap();
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);
}

#[test]
fn test_auto_on_reengages_on_next_poll() {
    let mut bench = Bench::new();
    bench.poll((45, 0), (23, 5)).unwrap();
    bench.command(2);
    bench.poll((45, 0), (23, 5)).unwrap();

    bench.command(1);
    assert_eq!(bench.mode(), AlertMode::AutoThresholdArmed);
    bench.poll((45, 0), (23, 5)).unwrap();
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);
}

#[test]
fn test_manual_on_plays_two_pulses() {
    let mut bench = Bench::new();
    bench.poll((30, 0), (23, 5)).unwrap();

    bench.command(3);
    let start = bench.clock.now_ns();
    let writes = bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);

    let highs: Vec<u64> = writes
        .iter()
        .filter(|w| w.level == PinState::High)
        .map(|w| w.at_ns - start)
        .collect();
    let first_pulse = highs.iter().filter(|t| **t < 100 * MS).count();
    let second_pulse = highs
        .iter()
        .filter(|t| (300 * MS..400 * MS).contains(*t))
        .count();
    assert!(first_pulse > 0);
    assert_eq!(first_pulse, second_pulse);
    assert_eq!(first_pulse + second_pulse, highs.len());
    assert_eq!(writes.last().map(|w| w.at_ns - start), Some(400 * MS));
    assert_eq!(bench.buzzer.output_level(), PinState::Low);

    // Manual mode ignores humidity
    bench.poll((20, 0), (23, 5)).unwrap();
    bench.alert_cycle();
    assert_eq!(bench.alert_register(), 1);
}

/// Poll `read` until it returns `expected` or `timeout` elapses
async fn wait_for<F, Fut>(timeout: Duration, expected: Vec<u16>, mut read: F) -> Result<Vec<u16>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<u16>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let values = read().await?;
        if values == expected || Instant::now() >= deadline {
            return Ok(values);
        }
        sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_daemon_with_simulated_hardware() -> Result<()> {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();

    let mut config = Config::default();
    config.hardware.driver = HardwareDriver::Mock;
    config.modbus.port = 0;
    config.simulation.humidity = 45.0;
    config.simulation.temperature = 23.5;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let socket_addr = daemon
        .modbus_local_addr()
        .expect("Modbus server should be bound");

    let ctx = std::sync::Arc::new(tokio::sync::Mutex::new(connect(socket_addr).await?));
    let read_map = || {
        let ctx = ctx.clone();
        async move {
            let values = ctx.lock().await.read_holding_registers(0, 5).await??;
            Ok::<_, anyhow::Error>(values)
        }
    };

    // First reading and first active alert cycle
    let values = wait_for(Duration::from_secs(5), vec![235, 0, 450, 0, 1], read_map).await?;
    assert_eq!(values, vec![235, 0, 450, 0, 1]);
    assert!(ctx.lock().await.read_coils(ALERT_ACTIVE_REGISTER, 1).await??[0]);

    // Off once: the alert stops while humidity stays at 45 %
    ctx.lock()
        .await
        .write_single_register(CONTROL_REGISTER, 0)
        .await??;
    let values = wait_for(Duration::from_secs(5), vec![235, 0, 450, 0, 0], read_map).await?;
    assert_eq!(values[4], 0);

    // Manual on
    ctx.lock()
        .await
        .write_single_register(CONTROL_REGISTER, 3)
        .await??;
    let values = wait_for(Duration::from_secs(5), vec![235, 0, 450, 0, 1], read_map).await?;
    assert_eq!(values[4], 1);
    assert_eq!(
        control::lock(&daemon.controller()).mode(),
        AlertMode::ManualActive
    );

    assert!(daemon.is_running());
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
