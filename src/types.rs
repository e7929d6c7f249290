//! Types shared by the reader session

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::frame::FrameError;
use crate::tag::DecodeError;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No command in flight
    Idle,
    /// A request/response command is awaiting its reply
    Configuring,
    /// The module is streaming tag reports
    ContinuousReading,
    /// Stop has been sent, trailing frames are being drained
    Stopping,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderState::Idle => "idle",
            ReaderState::Configuring => "configuring",
            ReaderState::ContinuousReading => "continuous reading",
            ReaderState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// RF link mode presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RfMode {
    /// DSB-ASK / FM0 / 40 kHz
    Fm0At40Khz = 0x00,
    /// PR-ASK / Miller4 / 250 kHz
    Miller4At250Khz = 0x01,
    /// PR-ASK / Miller4 / 300 kHz
    Miller4At300Khz = 0x02,
    /// DSB-ASK / FM0 / 400 kHz
    Fm0At400Khz = 0x03,
}

impl TryFrom<u8> for RfMode {
    type Error = UhfError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(RfMode::Fm0At40Khz),
            0x01 => Ok(RfMode::Miller4At250Khz),
            0x02 => Ok(RfMode::Miller4At300Khz),
            0x03 => Ok(RfMode::Fm0At400Khz),
            other => Err(UhfError::InvalidRfMode(other)),
        }
    }
}

/// Session timing and sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// How long a request/response command waits for its reply
    pub response_timeout: Duration,
    /// Read timeout for each poll while continuously reading
    pub poll_timeout: Duration,
    /// Read timeout for each drain read after stop
    pub drain_timeout: Duration,
    /// Maximum number of distinct tags kept per scan
    pub inventory_capacity: usize,
    /// Size of a single transport read
    pub read_chunk: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(1000),
            poll_timeout: Duration::from_millis(50),
            drain_timeout: Duration::from_millis(50),
            inventory_capacity: 64,
            read_chunk: 256,
        }
    }
}

impl ReaderConfig {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_inventory_capacity(mut self, capacity: usize) -> Self {
        self.inventory_capacity = capacity;
        self
    }

    pub fn with_read_chunk(mut self, len: usize) -> Self {
        self.read_chunk = len.max(1);
        self
    }
}

/// Errors that can occur during RFID operations
#[derive(Debug, Error)]
pub enum UhfError {
    /// Transport layer error (UART, serial, etc.)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("tag decode error: {0}")]
    Decode(#[from] DecodeError),

    /// No reply arrived within the response timeout
    #[error("no response to command {opcode:#04x}")]
    NoResponse { opcode: u8 },

    /// The module acknowledged with a failure status
    #[error("command {opcode:#04x} failed with status {status:#04x}")]
    CommandFailed { opcode: u8, status: u8 },

    #[error("invalid RF mode: {0} (expected 0-3)")]
    InvalidRfMode(u8),

    /// Invalid parameter passed to a function
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Reply was well-formed but not what the command expects
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("operation requires {expected} state, session is {actual}")]
    InvalidState {
        expected: ReaderState,
        actual: ReaderState,
    },
}

/// Convert bytes to uppercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
