// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-hygro-alarm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mock GPIO driver for simulation and tests
//!
//! The mock line plays two roles:
//!
//! - **Hygrometer data line**: when switched to input it replays a queued
//!   waveform, one sample per [`GpioLine::read`] call. Since the decoder reads
//!   the line exactly once per micro-tick, a waveform is expressed in
//!   micro-ticks rather than in microseconds. With a responder frame set, a
//!   fresh waveform is synthesised after every start signal, which is how the
//!   daemon runs without hardware.
//! - **Buzzer line**: every write is recorded with a timestamp taken from a
//!   [`SimClock`], so that tests driving the pattern generator with a
//!   [`SimDelay`] can check pulse and pause durations exactly.
//!
//! Clones share the same line state, so a test can keep a handle on a line
//! that has been boxed into a decoder or a pattern generator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;

use crate::gpio::{Direction, GpioError, GpioLine, PinState};

/// Samples the line stays high after release before the sensor answers
pub const SIM_RELEASE_TICKS: usize = 10;
/// Samples of each half of the sensor acknowledge
pub const SIM_ACK_TICKS: usize = 40;
/// Samples of the low separator preceding each bit
pub const SIM_SEPARATOR_TICKS: usize = 20;
/// High run encoding a zero bit
pub const SIM_ZERO_TICKS: usize = 8;
/// High run encoding a one bit
pub const SIM_ONE_TICKS: usize = 30;

/// Simulated monotonic clock shared between delays and mock lines
#[derive(Debug, Clone, Default)]
pub struct SimClock(Arc<AtomicU64>);

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elapsed simulated time in nanoseconds
    pub fn now_ns(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance_ns(&self, ns: u64) {
        self.0.fetch_add(ns, Ordering::SeqCst);
    }
}

/// Delay provider that advances a [`SimClock`] instead of waiting
#[derive(Debug, Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl SimDelay {
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(u64::from(ns));
    }
}

/// A level written on a mock line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// Simulated time of the write in nanoseconds
    pub at_ns: u64,
    pub level: PinState,
}

#[derive(Debug)]
struct MockLineState {
    direction: Direction,
    output: PinState,
    waveform: VecDeque<PinState>,
    responder: Option<[u8; 5]>,
    writes: VecDeque<LevelChange>,
}

/// Writes kept per line; older entries are dropped first
const MAX_RECORDED_WRITES: usize = 4096;

/// In-memory GPIO line
#[derive(Debug, Clone)]
pub struct MockGpioDriver {
    pin: u32,
    clock: SimClock,
    state: Arc<Mutex<MockLineState>>,
}

impl MockGpioDriver {
    /// Create a mock line. An idle line floats high (pull-up).
    pub fn new(pin: u32, clock: SimClock) -> Self {
        Self {
            pin,
            clock,
            state: Arc::new(Mutex::new(MockLineState {
                direction: Direction::Input,
                output: PinState::High,
                waveform: VecDeque::new(),
                responder: None,
                writes: VecDeque::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockLineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every start signal with `frame`
    pub fn respond_with(&self, frame: [u8; 5]) {
        self.state().responder = Some(frame);
    }

    /// Queue raw samples returned by subsequent reads in input mode
    pub fn queue_waveform<I: IntoIterator<Item = PinState>>(&self, samples: I) {
        self.state().waveform.extend(samples);
    }

    /// Queue the waveform of a complete sensor frame
    pub fn queue_frame(&self, frame: [u8; 5]) {
        self.queue_waveform(frame_waveform(frame));
    }

    /// Levels written so far, oldest first
    pub fn writes(&self) -> Vec<LevelChange> {
        self.state().writes.iter().copied().collect()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    /// Current direction of the line
    pub fn direction(&self) -> Direction {
        self.state().direction
    }

    /// Last level driven on the line
    pub fn output_level(&self) -> PinState {
        self.state().output
    }
}

impl GpioLine for MockGpioDriver {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), GpioError> {
        let mut state = self.state();
        state.direction = direction;
        if direction == Direction::Input && state.waveform.is_empty() {
            if let Some(frame) = state.responder {
                state.waveform.extend(frame_waveform(frame));
            }
        }
        Ok(())
    }

    fn write(&mut self, level: PinState) -> Result<(), GpioError> {
        let at_ns = self.clock.now_ns();
        let mut state = self.state();
        state.output = level;
        if state.writes.len() == MAX_RECORDED_WRITES {
            state.writes.pop_front();
        }
        state.writes.push_back(LevelChange { at_ns, level });
        Ok(())
    }

    fn read(&mut self) -> Result<PinState, GpioError> {
        let mut state = self.state();
        if state.direction == Direction::Output {
            return Ok(state.output);
        }
        Ok(state.waveform.pop_front().unwrap_or(PinState::High))
    }
}

/// Build the line samples a sensor emits for `frame`, after the host released
/// the line.
///
/// The sensor keeps the line high briefly, acknowledges with a low then high
/// pulse, then sends 40 bits MSB first, each as a low separator followed by a
/// short (zero) or long (one) high run, and finally a low separator before
/// letting the line float high.
pub fn frame_waveform(frame: [u8; 5]) -> Vec<PinState> {
    let mut samples = Vec::new();
    let mut push = |level: PinState, ticks: usize| {
        samples.extend(std::iter::repeat(level).take(ticks));
    };

    push(PinState::High, SIM_RELEASE_TICKS);
    push(PinState::Low, SIM_ACK_TICKS);
    push(PinState::High, SIM_ACK_TICKS);
    for byte in frame {
        for bit in (0..8).rev() {
            push(PinState::Low, SIM_SEPARATOR_TICKS);
            let high = if byte & (1 << bit) != 0 {
                SIM_ONE_TICKS
            } else {
                SIM_ZERO_TICKS
            };
            push(PinState::High, high);
        }
    }
    push(PinState::Low, SIM_SEPARATOR_TICKS);
    samples
}
