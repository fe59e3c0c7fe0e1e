//! In-memory spidev emulator for testing
//!
//! [`DummySpidev`] records every ioctl it receives and answers messages
//! either from a queue of programmed responses or, when the queue is empty,
//! by looping MOSI back to MISO. A [`DummyProbe`] shares its state so the
//! calls can be inspected after the backend has been moved into a
//! [`SpiDevice`](crate::SpiDevice).

use crate::backend::{SpiTransfer, SpidevBackend};

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default message size limit, matching spidev's default `bufsiz`
pub const DUMMY_MAX_TRANSFER_LEN: usize = 4096;

/// One recorded ioctl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCall {
    SetMode(u8),
    GetMode,
    SetBitsPerWord(u8),
    GetBitsPerWord,
    SetMaxSpeed(u32),
    GetMaxSpeed,
    Message(DummyMessage),
}

/// A recorded `SPI_IOC_MESSAGE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyMessage {
    /// Bytes shifted out
    pub tx: Vec<u8>,
    pub speed_hz: u32,
    pub bits_per_word: u8,
    pub delay_usecs: u16,
    pub cs_change: bool,
    /// Received bytes were thrown away (null rx buffer)
    pub rx_discarded: bool,
}

/// Injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyFault {
    SetMode,
    GetMode,
    SetBitsPerWord,
    GetBitsPerWord,
    SetMaxSpeed,
    GetMaxSpeed,
    /// Every message fails with `EIO`
    Transfer,
    /// Every message reports only this many bytes
    ShortTransfer(usize),
}

#[derive(Debug, Default)]
struct DummyState {
    mode: u8,
    bits_per_word: u8,
    speed_hz: u32,
    speed_limit: Option<u32>,
    calls: Vec<DummyCall>,
    responses: VecDeque<Vec<u8>>,
    faults: Vec<DummyFault>,
    closed: usize,
    in_flight: usize,
    max_in_flight: usize,
}

impl DummyState {
    fn check(&self, fault: DummyFault) -> io::Result<()> {
        if self.faults.contains(&fault) {
            Err(io::Error::from_raw_os_error(libc::EIO))
        } else {
            Ok(())
        }
    }
}

fn lock(state: &Mutex<DummyState>) -> MutexGuard<'_, DummyState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dummy spidev backend
#[derive(Debug)]
pub struct DummySpidev {
    handle: i32,
    max_transfer_len: usize,
    latency: Duration,
    state: Arc<Mutex<DummyState>>,
}

impl Default for DummySpidev {
    fn default() -> Self {
        Self::new()
    }
}

impl DummySpidev {
    pub fn new() -> Self {
        Self::with_handle(3)
    }

    /// Create a dummy that reports `handle` as its file descriptor
    pub fn with_handle(handle: i32) -> Self {
        Self {
            handle,
            max_transfer_len: DUMMY_MAX_TRANSFER_LEN,
            latency: Duration::ZERO,
            state: Arc::default(),
        }
    }

    /// Limit the size of a single message
    pub fn with_max_transfer_len(mut self, len: usize) -> Self {
        self.max_transfer_len = len;
        self
    }

    /// Make each message take at least `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Clamp the max speed the way a controller with a slower clock would
    pub fn with_speed_limit(self, limit_hz: u32) -> Self {
        lock(&self.state).speed_limit = Some(limit_hz);
        self
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Handle for inspecting and steering this dummy
    pub fn probe(&self) -> DummyProbe {
        DummyProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for DummySpidev {
    fn drop(&mut self) {
        log::debug!("spidev: dummy: closing handle {}", self.handle);
        lock(&self.state).closed += 1;
    }
}

impl SpidevBackend for DummySpidev {
    fn set_mode(&mut self, mode: u8) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(DummyCall::SetMode(mode));
        state.check(DummyFault::SetMode)?;
        state.mode = mode;
        Ok(())
    }

    fn mode(&mut self) -> io::Result<u8> {
        let mut state = lock(&self.state);
        state.calls.push(DummyCall::GetMode);
        state.check(DummyFault::GetMode)?;
        Ok(state.mode)
    }

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(DummyCall::SetBitsPerWord(bits));
        state.check(DummyFault::SetBitsPerWord)?;
        state.bits_per_word = bits;
        Ok(())
    }

    fn bits_per_word(&mut self) -> io::Result<u8> {
        let mut state = lock(&self.state);
        state.calls.push(DummyCall::GetBitsPerWord);
        state.check(DummyFault::GetBitsPerWord)?;
        Ok(state.bits_per_word)
    }

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(DummyCall::SetMaxSpeed(speed_hz));
        state.check(DummyFault::SetMaxSpeed)?;
        state.speed_hz = match state.speed_limit {
            Some(limit) => speed_hz.min(limit),
            None => speed_hz,
        };
        Ok(())
    }

    fn max_speed_hz(&mut self) -> io::Result<u32> {
        let mut state = lock(&self.state);
        state.calls.push(DummyCall::GetMaxSpeed);
        state.check(DummyFault::GetMaxSpeed)?;
        Ok(state.speed_hz)
    }

    fn max_transfer_len(&self) -> usize {
        self.max_transfer_len
    }

    fn transfer(&mut self, xfer: &mut SpiTransfer<'_>) -> io::Result<usize> {
        let len = xfer.buffers.len();
        let response = {
            let mut state = lock(&self.state);
            state.calls.push(DummyCall::Message(DummyMessage {
                tx: xfer.buffers.tx().to_vec(),
                speed_hz: xfer.speed_hz,
                bits_per_word: xfer.bits_per_word,
                delay_usecs: xfer.delay_usecs,
                cs_change: xfer.cs_change,
                rx_discarded: xfer.buffers.rx_mut().is_none(),
            }));
            state.check(DummyFault::Transfer)?;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.responses.pop_front()
        };

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let response = response.unwrap_or_else(|| xfer.buffers.tx().to_vec());
        if let Some(rx) = xfer.buffers.rx_mut() {
            let n = rx.len().min(response.len());
            rx[..n].copy_from_slice(&response[..n]);
        }

        let mut state = lock(&self.state);
        state.in_flight -= 1;
        let short = state.faults.iter().find_map(|f| match f {
            DummyFault::ShortTransfer(n) => Some(*n),
            _ => None,
        });
        Ok(short.map_or(len, |n| n.min(len)))
    }
}

/// Shared view of a [`DummySpidev`]'s state
#[derive(Debug, Clone)]
pub struct DummyProbe {
    state: Arc<Mutex<DummyState>>,
}

impl DummyProbe {
    /// All ioctls received so far
    pub fn calls(&self) -> Vec<DummyCall> {
        lock(&self.state).calls.clone()
    }

    /// Only the messages
    pub fn messages(&self) -> Vec<DummyMessage> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                DummyCall::Message(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Queue the MISO bytes for the next message
    pub fn push_response(&self, rx: impl Into<Vec<u8>>) {
        lock(&self.state).responses.push_back(rx.into());
    }

    /// Make the given operation fail from now on
    pub fn inject(&self, fault: DummyFault) {
        lock(&self.state).faults.push(fault);
    }

    pub fn clear_faults(&self) {
        lock(&self.state).faults.clear();
    }

    /// How many times the handle has been closed
    pub fn close_count(&self) -> usize {
        lock(&self.state).closed
    }

    /// Highest number of messages observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        lock(&self.state).max_in_flight
    }
}
