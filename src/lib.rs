//! Driver for UHF RFID reader modules speaking the `A5 5A … 0D 0A` framed
//! serial protocol, with support for multiple transport backends.
//!
//! The module is configured through request/response commands (power, RF
//! link mode, reset) and reports tags either one at a time or as a continuous
//! stream. Streamed reports are reassembled from arbitrary read fragments,
//! deduplicated by EPC into a bounded [`Inventory`], and ranked by
//! [`select`].
//!
//! # Features
//!
//! - `uart-esp32` - UART transport for ESP32 using esp-idf-svc
//! - `serial` - Serial port transport for desktop using serialport crate
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use uhf_rfid_module::{RfMode, SerialTransport, UhfRfid};
//!
//! let transport = SerialTransport::new("/dev/ttyUSB0", 115200)?;
//! let mut rfid = UhfRfid::new(transport);
//!
//! rfid.set_power(20.0, false)?;
//! rfid.set_rf_mode(RfMode::Fm0At400Khz, false)?;
//!
//! let inventory = rfid.read_for(Duration::from_secs(2))?;
//! for tag in &inventory {
//!     println!("{}", tag);
//! }
//! if let Some(best) = inventory.best() {
//!     println!("Closest tag: {}", best.epc_hex());
//! }
//! ```

pub mod frame;
mod inventory;
mod reader;
pub mod scanner;
mod selector;
pub mod tag;
mod transport;
mod types;

#[cfg(feature = "uart-esp32")]
mod uart;

#[cfg(feature = "serial")]
mod serial;

// Re-exports
pub use frame::{Command, FrameError, Response};
pub use inventory::{Inventory, MergeOutcome};
pub use reader::UhfRfid;
pub use scanner::{ScanOutcome, ScanStats, StreamScanner};
pub use selector::select;
pub use tag::{DecodeError, MAX_EPC_LEN, TagRecord};
pub use transport::RfidTransport;
pub use types::{ReaderConfig, ReaderState, RfMode, UhfError};

#[cfg(feature = "uart-esp32")]
pub use uart::UartTransport;

#[cfg(feature = "serial")]
pub use serial::{DEFAULT_BAUD_RATE, SerialTransport};
