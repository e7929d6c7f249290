//! Tag-report decoding

use std::fmt;

use thiserror::Error;

use crate::types::bytes_to_hex;

/// Longest EPC a tag can report (31 words)
pub const MAX_EPC_LEN: usize = 62;

/// Frame offset of the PC word
const PC_OFFSET: usize = 5;

/// Frame offset of the first EPC byte
const EPC_OFFSET: usize = 7;

/// Errors raised while decoding a tag report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("tag report truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("EPC of {0} bytes exceeds the 62-byte maximum")]
    EpcTooLong(usize),

    #[error("EPC length {0} is not a whole number of words")]
    OddEpcLength(usize),
}

/// A tag seen by the reader
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub epc: Vec<u8>,
    /// Signal strength in dBm
    pub rssi: f32,
    /// Number of times this tag has been reported during the scan
    pub read_count: u32,
}

impl TagRecord {
    /// Create a first-sighting record, validating the EPC length
    pub fn new(epc: impl Into<Vec<u8>>, rssi: f32) -> Result<Self, DecodeError> {
        let epc = epc.into();
        if epc.len() > MAX_EPC_LEN {
            return Err(DecodeError::EpcTooLong(epc.len()));
        }
        if epc.len() % 2 != 0 {
            return Err(DecodeError::OddEpcLength(epc.len()));
        }
        Ok(Self {
            epc,
            rssi,
            read_count: 1,
        })
    }

    pub fn epc_len(&self) -> usize {
        self.epc.len()
    }

    /// EPC as an uppercase hex string
    pub fn epc_hex(&self) -> String {
        bytes_to_hex(&self.epc)
    }
}

impl fmt::Display for TagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rssi={:.1} dBm count={}",
            self.epc_hex(),
            self.rssi,
            self.read_count
        )
    }
}

/// EPC length in bytes encoded in the top five bits of a PC word
pub fn epc_len_from_pc(pc: u16) -> usize {
    (((pc >> 11) & 0x1F) as usize) * 2
}

/// Decode a tag-report frame.
///
/// Offsets are taken from the start of the frame: PC word at 5-6, EPC from 7,
/// then a signed big-endian RSSI in tenths of a dBm. Bytes after the RSSI are
/// ignored, so callers may pass either the whole frame or just its body.
pub fn decode_tag(frame: &[u8]) -> Result<TagRecord, DecodeError> {
    let pc = frame
        .get(PC_OFFSET..PC_OFFSET + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DecodeError::Truncated {
            needed: EPC_OFFSET,
            available: frame.len(),
        })?;

    let epc_len = epc_len_from_pc(pc);
    if epc_len > MAX_EPC_LEN {
        return Err(DecodeError::EpcTooLong(epc_len));
    }

    let rssi_offset = EPC_OFFSET + epc_len;
    let needed = rssi_offset + 2;
    if frame.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: frame.len(),
        });
    }

    let raw_rssi = i16::from_be_bytes([frame[rssi_offset], frame[rssi_offset + 1]]);
    TagRecord::new(&frame[EPC_OFFSET..rssi_offset], raw_rssi as f32 / 10.0)
}
