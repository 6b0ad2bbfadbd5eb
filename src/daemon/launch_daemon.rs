// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::alert::{AlertDriveState, AlertPatternGenerator, ALERT_CYCLE_PERIOD};
use crate::config::{Config, ModbusConfig};
use crate::control::{self, AlertController, SharedAlertController};
use crate::gpio::{self, GpioLine, SpinDelay};
use crate::modbus::HygroModbusServer;
use crate::registers::{
    RegisterError, RegisterStore, ALERT_ACTIVE_REGISTER, HUMIDITY_REGISTER, TEMPERATURE_REGISTER,
};
use crate::sensor::{SensorDecoder, SensorReading};

/// Interval between two sensor reads
pub const SENSOR_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Interval between two heartbeat log lines
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Granularity at which idle tasks notice a shutdown request
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Time given to each task to finish during `join`
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

type BoxedDecoder = SensorDecoder<Box<dyn GpioLine>, SpinDelay>;
type BoxedGenerator = AlertPatternGenerator<Box<dyn GpioLine>, SpinDelay>;

/// Hosts the alarm tasks: Modbus server, sensor poll loop, alert pattern loop
/// and heartbeat.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    fatal: Arc<Notify>,
    store: Arc<RegisterStore>,
    controller: SharedAlertController,
    modbus_addr: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            fatal: Arc::new(Notify::new()),
            store: Arc::new(RegisterStore::new()),
            controller: AlertController::new().into_shared(),
            modbus_addr: None,
        }
    }

    /// Launch all configured tasks based on configuration.
    ///
    /// Fails without starting anything if either GPIO line cannot be acquired.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let lines = gpio::open_alarm_lines(&config.hardware, &config.simulation)
            .context("Failed to acquire GPIO lines")?;
        let silence = control::lock(&self.controller).silence_signal();
        let generator = AlertPatternGenerator::new(lines.alert, SpinDelay, silence)
            .context("Failed to configure the alert line")?;

        control::attach_to_store(&self.controller, &self.store);

        if config.modbus.enabled {
            self.start_modbus_server(&config.modbus).await?;
        }

        self.start_sensor_poll(SensorDecoder::new(lines.sensor, SpinDelay));
        self.start_alert_pattern(generator);
        self.start_heartbeat();

        Ok(())
    }

    /// Bind the Modbus listener and serve the register store
    async fn start_modbus_server(&mut self, config: &ModbusConfig) -> Result<()> {
        info!(
            "Starting modbus server on {}:{}",
            config.address, config.port
        );
        let listener = TcpListener::bind((config.address.as_str(), config.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind Modbus server to {}:{}",
                    config.address, config.port
                )
            })?;
        let local_addr = listener.local_addr()?;
        self.modbus_addr = Some(local_addr);
        debug!("Modbus server listening on {}", local_addr);

        let store = self.store.clone();
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            let server = Server::new(listener);

            let on_connected = move |stream, socket_addr| {
                let store = store.clone();
                async move {
                    debug!("Modbus client connected from {}", socket_addr);
                    accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                        Ok(Some(HygroModbusServer::new(store.clone())))
                    })
                }
            };

            let on_process_error = |err| {
                error!("Modbus server error: {err}");
            };

            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                time::sleep(SHUTDOWN_POLL_INTERVAL).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start the sensor poll loop
    fn start_sensor_poll(&mut self, decoder: BoxedDecoder) {
        debug!(
            "Starting sensor poll loop every {} ms",
            SENSOR_POLL_INTERVAL.as_millis()
        );
        let running = self.running.clone();
        let fatal = self.fatal.clone();
        let controller = self.controller.clone();
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            let result = poll_sensor(decoder, &running, &controller, &store).await;
            if let Err(e) = &result {
                report_fatal(&running, &fatal, "Sensor poll loop", e);
            }
            result
        });

        self.tasks.push(task);
    }

    /// Start the alert pattern loop
    fn start_alert_pattern(&mut self, generator: BoxedGenerator) {
        debug!(
            "Starting alert pattern loop every {} ms",
            ALERT_CYCLE_PERIOD.as_millis()
        );
        let running = self.running.clone();
        let fatal = self.fatal.clone();
        let controller = self.controller.clone();
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            let result = drive_alert(generator, &running, &controller, &store).await;
            if let Err(e) = &result {
                report_fatal(&running, &fatal, "Alert pattern loop", e);
            }
            result
        });

        self.tasks.push(task);
    }

    /// Start a heartbeat task that logs the alarm status periodically
    fn start_heartbeat(&mut self) {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let controller = self.controller.clone();
        let task = tokio::spawn(async move {
            while sleep_while_running(&running, HEARTBEAT_INTERVAL).await {
                let controller = control::lock(&controller);
                let snapshot = controller.snapshot();
                info!(
                    "Daemon heartbeat: mode {:?}, suppressed {}, drive intent {}, humidity {}, temperature {}, last reading {}",
                    snapshot.mode,
                    snapshot.suppressed,
                    snapshot.drive_intent,
                    format_tenths(snapshot.humidity_tenths, "%"),
                    format_tenths(controller.temperature_tenths(), "°C"),
                    controller
                        .last_reading_at()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                );
            }
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Resolves once a task failed fatally and the daemon stopped itself
    pub async fn wait_fatal(&self) {
        self.fatal.notified().await;
    }

    /// Whether the daemon tasks are still meant to run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register store served over Modbus
    pub fn store(&self) -> Arc<RegisterStore> {
        self.store.clone()
    }

    pub fn controller(&self) -> SharedAlertController {
        self.controller.clone()
    }

    /// Address the Modbus server is bound to, once launched
    pub fn modbus_local_addr(&self) -> Option<SocketAddr> {
        self.modbus_addr
    }

    /// Wait for all tasks to complete.
    ///
    /// Returns the first task error, if any.
    pub async fn join(self) -> Result<()> {
        let mut first_error = None;
        for task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    error!("Task panicked: {}", e);
                }
                Err(_) => {
                    warn!("Task did not complete within timeout period, may be hung");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

async fn poll_sensor(
    mut decoder: BoxedDecoder,
    running: &AtomicBool,
    controller: &SharedAlertController,
    store: &RegisterStore,
) -> Result<()> {
    let mut interval = time::interval(SENSOR_POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (returned, result) = task::spawn_blocking(move || {
            let result = decoder.read_sensor();
            (decoder, result)
        })
        .await
        .context("Sensor decode task panicked")?;
        decoder = returned;

        match result {
            Ok(reading) => {
                publish_reading(controller, store, &reading)?;
            }
            Err(e) if e.is_transient() => {
                warn!("Sensor read failed, keeping previous values: {}", e);
            }
            Err(e) => return Err(e).context("Sensor line failure"),
        }
    }
}

/// Feed a reading to the controller, then expose it in the register map
fn publish_reading(
    controller: &SharedAlertController,
    store: &RegisterStore,
    reading: &SensorReading,
) -> Result<(), RegisterError> {
    let drive_intent = control::lock(controller).observe_reading(reading);
    debug!(
        "Sensor reading: {}.{} % RH, {}.{} °C, drive intent {}",
        reading.humidity_int,
        reading.humidity_frac,
        reading.temperature_int,
        reading.temperature_frac,
        drive_intent
    );

    store
        .holding
        .set(TEMPERATURE_REGISTER, reading.temperature_tenths())?;
    store
        .holding
        .set(HUMIDITY_REGISTER, reading.humidity_tenths())
}

async fn drive_alert(
    mut generator: BoxedGenerator,
    running: &AtomicBool,
    controller: &SharedAlertController,
    store: &RegisterStore,
) -> Result<()> {
    let mut interval = time::interval(ALERT_CYCLE_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous = AlertDriveState::default();
    let silence = control::lock(controller).silence_signal();

    loop {
        interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = control::lock(controller).snapshot();
        let (returned, result) = task::spawn_blocking(move || {
            let result = generator.run_cycle(&snapshot);
            (generator, result)
        })
        .await
        .context("Alert pattern task panicked")?;
        generator = returned;

        let mut state = result.context("Alert line failure")?;
        // An off command landing after the pattern finished still wins
        if silence.raised_since(snapshot.silence_epoch) {
            state.is_active = false;
        }
        if state != previous {
            info!(
                "Alert is now {}",
                if state.is_active { "active" } else { "inactive" }
            );
            previous = state;
        }
        publish_drive_state(store, state)?;
        if state.is_active && silence.raised_since(snapshot.silence_epoch) {
            publish_drive_state(store, AlertDriveState { is_active: false })?;
        }
    }
}

fn publish_drive_state(store: &RegisterStore, state: AlertDriveState) -> Result<(), RegisterError> {
    store
        .holding
        .set(ALERT_ACTIVE_REGISTER, u16::from(state.is_active))?;
    store.coils.set(ALERT_ACTIVE_REGISTER, state.is_active)
}

fn report_fatal(running: &AtomicBool, fatal: &Notify, source: &str, err: &anyhow::Error) {
    error!("{} stopped: {:#}", source, err);
    running.store(false, Ordering::SeqCst);
    fatal.notify_one();
}

/// Sleep for `duration` unless a shutdown is requested first.
///
/// Returns whether the daemon is still running.
async fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = time::Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = time::Instant::now();
        if now >= deadline {
            return true;
        }
        time::sleep(SHUTDOWN_POLL_INTERVAL.min(deadline - now)).await;
    }
    false
}

fn format_tenths(value: Option<u16>, unit: &str) -> String {
    match value {
        Some(tenths) => format!("{}.{} {}", tenths / 10, tenths % 10, unit),
        None => "n/a".to_string(),
    }
}
