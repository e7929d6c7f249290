use log::{debug, error, warn};
use std::time::{Duration, Instant};

use crate::frame::{self, Command, Response, STATUS_OK};
use crate::inventory::Inventory;
use crate::scanner::{ScanOutcome, StreamScanner};
use crate::tag::{self, TagRecord};
use crate::transport::RfidTransport;
use crate::types::{ReaderConfig, ReaderState, RfMode, UhfError};

/// A session with one reader module.
///
/// Request/response commands are strictly serialized: one frame out, one
/// frame back (or a timeout) before the next command. Between
/// `start_reading` and `stop_reading` the module streams tag reports that are
/// folded into the session's inventory by `poll`.
pub struct UhfRfid<T: RfidTransport> {
    transport: T,
    config: ReaderConfig,
    state: ReaderState,
    inventory: Inventory,
    scanner: StreamScanner,
    rx_buf: Vec<u8>,
}

impl<T: RfidTransport> UhfRfid<T> {
    // Command codes
    const SET_POWER: u8 = 0x10;
    const GET_POWER: u8 = 0x12;
    const RESET: u8 = 0x2A;
    const SET_RF_MODE: u8 = 0x52;
    const GET_RF_MODE: u8 = 0x54;
    const SINGLE_READ: u8 = 0x80;
    const START_READ: u8 = 0x82;
    const STOP_READ: u8 = 0x8C;

    // Power command option bytes
    const POWER_SAVE: u8 = 0x20;
    const POWER_READ_WRITE: u8 = 0x01;

    /// Cycle count used for open-ended reading
    const CONTINUOUS_CYCLES: u16 = 0xFFFF;

    /// Create a new reader session with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ReaderConfig::default())
    }

    pub fn with_config(transport: T, config: ReaderConfig) -> Self {
        Self {
            transport,
            inventory: Inventory::with_capacity(config.inventory_capacity),
            scanner: StreamScanner::new(),
            rx_buf: vec![0u8; config.read_chunk.max(1)],
            state: ReaderState::Idle,
            config,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Tags collected by the current or most recent scan
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Move the collected tags out, leaving an empty inventory behind
    pub fn take_inventory(&mut self) -> Inventory {
        std::mem::replace(
            &mut self.inventory,
            Inventory::with_capacity(self.config.inventory_capacity),
        )
    }

    /// Most-read tag of the current inventory, strongest signal on ties
    pub fn best_tag(&self) -> Option<&TagRecord> {
        self.inventory.best()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Set read and write power in dBm, optionally persisting it on the module
    pub fn set_power(&mut self, power_dbm: f32, save: bool) -> Result<(), UhfError> {
        let raw = power_dbm * 100.0;
        if !raw.is_finite() || raw < 0.0 || raw > u16::MAX as f32 {
            return Err(UhfError::InvalidParameter(format!(
                "Power {} dBm cannot be encoded",
                power_dbm
            )));
        }

        let [msb, lsb] = (raw.round() as u16).to_be_bytes();
        let option = if save { Self::POWER_SAVE } else { 0x00 };
        let command = Command::new(
            Self::SET_POWER,
            vec![option, Self::POWER_READ_WRITE, msb, lsb, msb, lsb],
        );

        let response = self.exec(&command, self.config.response_timeout)?;
        Self::check_ack(&response, Self::SET_POWER)
    }

    /// Get the current read power in dBm
    pub fn get_power(&mut self) -> Result<f32, UhfError> {
        let command = Command::new(Self::GET_POWER, Vec::new());
        let response = self.exec(&command, self.config.response_timeout)?;

        response
            .u16_at(6)
            .map(|raw| raw as f32 / 100.0)
            .ok_or_else(|| UhfError::InvalidResponse("Power reply too short".into()))
    }

    /// Select the RF link mode, optionally persisting it on the module
    pub fn set_rf_mode(&mut self, mode: RfMode, save: bool) -> Result<(), UhfError> {
        let command = Command::new(
            Self::SET_RF_MODE,
            vec![0x00, if save { 0x01 } else { 0x00 }, mode as u8],
        );
        let response = self.exec(&command, self.config.response_timeout)?;
        Self::check_ack(&response, Self::SET_RF_MODE)
    }

    /// Get the active RF link mode
    pub fn get_rf_mode(&mut self) -> Result<RfMode, UhfError> {
        let command = Command::new(Self::GET_RF_MODE, Vec::new());
        let response = self.exec(&command, self.config.response_timeout)?;

        let raw = response
            .byte_at(6)
            .ok_or_else(|| UhfError::InvalidResponse("RF mode reply too short".into()))?;
        RfMode::try_from(raw)
            .map_err(|_| UhfError::InvalidResponse(format!("Unknown RF mode {:#04x}", raw)))
    }

    /// Restore the module's default configuration
    pub fn software_reset(&mut self) -> Result<(), UhfError> {
        let command = Command::new(Self::RESET, Vec::new());
        let response = self.exec(&command, self.config.response_timeout)?;
        Self::check_ack(&response, Self::RESET)
    }

    /// Read a single tag, letting the module search for up to `timeout_ms`.
    ///
    /// Returns `None` when the module answers with a bare status instead of a
    /// tag report.
    pub fn single_read(&mut self, timeout_ms: u16) -> Result<Option<TagRecord>, UhfError> {
        let command = Command::new(Self::SINGLE_READ, timeout_ms.to_be_bytes());
        let wait = self.config.response_timeout + Duration::from_millis(timeout_ms as u64);
        let response = self.exec(&command, wait)?;

        if response.params().len() <= 1 {
            debug!("No tag found (status {:?})", response.status());
            return Ok(None);
        }
        Ok(Some(tag::decode_tag(response.body())?))
    }

    /// Start continuous reading for `cycles` inventory rounds.
    ///
    /// Clears the inventory. The module replies with a stream of tag reports
    /// rather than a single acknowledgement; call `poll` to collect them.
    pub fn start_reading(&mut self, cycles: u16) -> Result<(), UhfError> {
        self.expect_state(ReaderState::Idle)?;

        self.inventory = Inventory::with_capacity(self.config.inventory_capacity);
        self.scanner.reset();

        let frame = Command::new(Self::START_READ, cycles.to_be_bytes()).encode()?;
        self.transport.clear_input().map_err(transport_error)?;
        self.send(&frame)?;

        self.state = ReaderState::ContinuousReading;
        Ok(())
    }

    /// Read whatever the module has streamed and merge it into the inventory.
    ///
    /// Waits at most the configured poll timeout. A transport failure ends
    /// the scan and returns the session to idle, keeping the inventory.
    pub fn poll(&mut self) -> Result<ScanOutcome, UhfError> {
        self.expect_state(ReaderState::ContinuousReading)?;

        let timeout = as_timeout_ms(self.config.poll_timeout);
        match self.read_chunk(timeout) {
            Ok(n) => {
                let outcome = self.scanner.feed(&self.rx_buf[..n], &mut self.inventory);
                if outcome.frames > 0 {
                    debug!(
                        "Decoded {} tag reports, {} new ({} tags total)",
                        outcome.frames,
                        outcome.new_tags,
                        self.inventory.len()
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                self.state = ReaderState::Idle;
                Err(e)
            }
        }
    }

    /// Stop continuous reading and hand over the collected inventory.
    ///
    /// Frames already in flight when the stop command is sent are drained
    /// into the inventory before it is returned.
    pub fn stop_reading(&mut self) -> Result<Inventory, UhfError> {
        self.expect_state(ReaderState::ContinuousReading)?;

        self.state = ReaderState::Stopping;
        let result = self.stop_and_drain();
        self.state = ReaderState::Idle;
        result?;

        let stats = self.scanner.stats();
        debug!(
            "Scan finished: {} tags, {} reports, {} rejected frames, {} dropped",
            self.inventory.len(),
            stats.frames,
            stats.rejected,
            self.inventory.dropped()
        );
        Ok(self.take_inventory())
    }

    /// Read continuously for `duration`, then stop and return the inventory
    pub fn read_for(&mut self, duration: Duration) -> Result<Inventory, UhfError> {
        self.start_reading(Self::CONTINUOUS_CYCLES)?;

        let start = Instant::now();
        while start.elapsed() < duration {
            self.poll()?;
        }

        self.stop_reading()
    }

    fn stop_and_drain(&mut self) -> Result<(), UhfError> {
        let frame = Command::new(Self::STOP_READ, Vec::new()).encode()?;
        self.send(&frame)?;

        let deadline = Instant::now() + self.config.response_timeout;
        let timeout = as_timeout_ms(self.config.drain_timeout);
        while Instant::now() < deadline {
            let n = self.read_chunk(timeout)?;
            if n == 0 {
                break;
            }
            self.scanner.feed(&self.rx_buf[..n], &mut self.inventory);
        }

        if !self.scanner.pending().is_empty() {
            debug!(
                "Discarding {} bytes of an incomplete frame",
                self.scanner.pending().len()
            );
        }
        Ok(())
    }

    fn check_ack(response: &Response, opcode: u8) -> Result<(), UhfError> {
        match response.status() {
            Some(STATUS_OK) => Ok(()),
            Some(status) => {
                warn!("Command {:#04x} failed with status {:#04x}", opcode, status);
                Err(UhfError::CommandFailed { opcode, status })
            }
            None => Err(UhfError::InvalidResponse(format!(
                "Reply to {:#04x} carries no status",
                opcode
            ))),
        }
    }

    fn expect_state(&self, expected: ReaderState) -> Result<(), UhfError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(UhfError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Send one command and wait up to `timeout` for its reply
    fn exec(&mut self, command: &Command, timeout: Duration) -> Result<Response, UhfError> {
        self.expect_state(ReaderState::Idle)?;

        self.state = ReaderState::Configuring;
        let result = self.exchange(command, timeout);
        self.state = ReaderState::Idle;
        result
    }

    fn exchange(&mut self, command: &Command, timeout: Duration) -> Result<Response, UhfError> {
        let frame = command.encode()?;
        self.transport.clear_input().map_err(transport_error)?;
        self.send(&frame)?;

        let deadline = Instant::now() + timeout;
        let mut received = Vec::new();
        loop {
            if let Some(range) = frame::find_frame(&received) {
                let response = frame::decode(&received[range])?;
                debug!(
                    "Received {} bytes: {:02X?}",
                    response.as_bytes().len(),
                    response.as_bytes()
                );
                if response.opcode() != command.opcode() {
                    debug!(
                        "Reply opcode {:#04x} differs from command {:#04x}",
                        response.opcode(),
                        command.opcode()
                    );
                }
                return Ok(response);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    "No response to command {:#04x} within {:?}",
                    command.opcode(),
                    timeout
                );
                return Err(UhfError::NoResponse {
                    opcode: command.opcode(),
                });
            }

            let n = self.read_chunk(as_timeout_ms(remaining))?;
            received.extend_from_slice(&self.rx_buf[..n]);
        }
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), UhfError> {
        debug!("Sending command: {:02X?}", frame);
        let written = self.transport.write(frame).map_err(transport_error)?;
        if written != frame.len() {
            error!("Short write: {} of {} bytes", written, frame.len());
            return Err(UhfError::Transport(format!(
                "Short write: {} of {} bytes",
                written,
                frame.len()
            )));
        }
        self.transport.flush().map_err(transport_error)
    }

    /// Read into the session buffer, sized to what the transport has waiting
    fn read_chunk(&mut self, timeout_ms: u32) -> Result<usize, UhfError> {
        let buffered = self.transport.buffered_len().map_err(transport_error)?;
        let len = buffered.max(self.config.read_chunk).max(1);
        if self.rx_buf.len() < len {
            self.rx_buf.resize(len, 0);
        }

        self.transport
            .read(&mut self.rx_buf[..len], timeout_ms)
            .map(|n| n.min(len))
            .map_err(|e| {
                error!("Read error: {:?}", e);
                transport_error(e)
            })
    }
}

fn transport_error<E: std::fmt::Debug>(e: E) -> UhfError {
    UhfError::Transport(format!("{:?}", e))
}

fn as_timeout_ms(timeout: Duration) -> u32 {
    timeout.as_millis().clamp(1, u32::MAX as u128) as u32
}
