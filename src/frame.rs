//! Command/response framing for the module's serial protocol.
//!
//! ```text
//! offset 0-1 : A5 5A          preamble
//! offset 2-3 : frame_len      big-endian, preamble to terminator inclusive
//! offset 4   : opcode
//! offset 5.. : parameters     (frame_len - 8 bytes)
//! offset N-3 : checksum       XOR(len_hi, len_lo, opcode, parameters...)
//! offset N-2 : 0D
//! offset N-1 : 0A
//! ```

use std::ops::Range;

use thiserror::Error;

/// Start-of-frame marker
pub const PREAMBLE: [u8; 2] = [0xA5, 0x5A];

/// End-of-frame marker (CR LF)
pub const TERMINATOR: [u8; 2] = [0x0D, 0x0A];

/// Bytes every frame carries besides its payload: preamble, length, checksum, terminator
pub const FRAME_OVERHEAD: usize = 7;

/// Smallest well-formed frame: framing plus an opcode
pub const MIN_FRAME_LEN: usize = FRAME_OVERHEAD + 1;

/// Largest frame the 16-bit length field can describe
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Largest frame accepted from the module. Longer declared lengths are treated as noise.
pub const MAX_RX_FRAME_LEN: usize = 256;

/// Status byte value for a successful acknowledgement
pub const STATUS_OK: u8 = 0x01;

/// Errors raised while building or validating a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("bad preamble: expected A5 5A, got {0:02X?}")]
    BadPreamble([u8; 2]),

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("bad terminator: expected 0D 0A, got {0:02X?}")]
    BadTerminator([u8; 2]),

    #[error("declared frame length {declared} does not match the {actual}-byte frame")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// A command to the module: opcode plus parameter bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: u8,
    params: Vec<u8>,
}

impl Command {
    pub fn new(opcode: u8, params: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            params: params.into(),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Serialize into a wire frame
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode(self.opcode, &self.params)
    }
}

/// A validated frame received from the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    frame: Vec<u8>,
}

impl Response {
    /// Byte 4: the opcode this frame answers or reports
    pub fn opcode(&self) -> u8 {
        self.frame[4]
    }

    /// Parameter bytes between the opcode and the checksum
    pub fn params(&self) -> &[u8] {
        &self.frame[5..self.frame.len() - 3]
    }

    /// Byte 5, the status flag of ack-style responses
    pub fn status(&self) -> Option<u8> {
        self.params().first().copied()
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    /// Byte at an offset from the start of the frame, within the body
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.body().get(offset).copied()
    }

    /// Big-endian word at an offset from the start of the frame, within the body
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = self.body().get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// The frame up to and including the last parameter byte
    pub fn body(&self) -> &[u8] {
        &self.frame[..self.frame.len() - 3]
    }

    /// The whole frame, preamble to terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }
}

/// XOR of every byte
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Build a frame for `opcode` and `params`.
///
/// The length field holds the total frame length including the seven framing
/// bytes, and the checksum covers the two length bytes followed by the payload.
pub fn encode(opcode: u8, params: &[u8]) -> Result<Vec<u8>, FrameError> {
    let frame_len = params.len() + 1 + FRAME_OVERHEAD;
    if frame_len > MAX_FRAME_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: params.len() + 1,
            max: MAX_FRAME_LEN - FRAME_OVERHEAD,
        });
    }

    let len = (frame_len as u16).to_be_bytes();
    let checksum = len
        .iter()
        .chain(std::iter::once(&opcode))
        .chain(params.iter())
        .fold(0u8, |acc, &b| acc ^ b);

    let mut frame = Vec::with_capacity(frame_len);
    frame.extend_from_slice(&PREAMBLE);
    frame.extend_from_slice(&len);
    frame.push(opcode);
    frame.extend_from_slice(params);
    frame.push(checksum);
    frame.extend_from_slice(&TERMINATOR);
    Ok(frame)
}

/// Validate one frame and unwrap its payload.
///
/// `bytes` is expected to hold a single frame. When the slice itself ends in a
/// terminator the checksum is verified over all of it, so a corrupted length
/// is reported as `ChecksumMismatch` rather than as a truncation or as a
/// shorter frame ending on a `0D 0A` inside the payload.
pub fn decode(bytes: &[u8]) -> Result<Response, FrameError> {
    let available = bytes.len();
    if available < PREAMBLE.len() {
        return Err(FrameError::Truncated {
            needed: MIN_FRAME_LEN,
            available,
        });
    }
    if bytes[..2] != PREAMBLE {
        return Err(FrameError::BadPreamble([bytes[0], bytes[1]]));
    }
    if available < MIN_FRAME_LEN {
        let needed = declared_len(bytes).map_or(MIN_FRAME_LEN, |len| len.max(MIN_FRAME_LEN));
        return Err(FrameError::Truncated { needed, available });
    }

    let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let terminated_at = |end: usize| {
        (MIN_FRAME_LEN..=available).contains(&end) && bytes[end - 2..end] == TERMINATOR
    };

    let end = if terminated_at(available) {
        available
    } else if terminated_at(declared) {
        declared
    } else if declared > available {
        return Err(FrameError::Truncated {
            needed: declared,
            available,
        });
    } else if declared >= MIN_FRAME_LEN {
        declared
    } else {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: available,
        });
    };

    let expected = checksum(&bytes[2..end - 3]);
    let actual = bytes[end - 3];
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    if bytes[end - 2..end] != TERMINATOR {
        return Err(FrameError::BadTerminator([bytes[end - 2], bytes[end - 1]]));
    }

    if declared != end {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: end,
        });
    }

    Ok(Response {
        frame: bytes[..end].to_vec(),
    })
}

/// Length field of a frame starting at `buf[0]`, if the header is present
pub fn declared_len(buf: &[u8]) -> Option<usize> {
    let len = buf.get(2..4)?;
    Some(u16::from_be_bytes([len[0], len[1]]) as usize)
}

/// Locate the first complete frame in a receive buffer.
///
/// Bytes before the preamble are skipped. When the first plausible frame is
/// still incomplete its preamble may be noise, so the search goes on for a
/// later frame that decodes cleanly. Returns `None` if there is none yet.
pub fn find_frame(buf: &[u8]) -> Option<Range<usize>> {
    let mut incomplete = false;
    let mut i = 0;
    while i + PREAMBLE.len() <= buf.len() {
        if buf[i..i + 2] != PREAMBLE {
            i += 1;
            continue;
        }
        let len = declared_len(&buf[i..])?;
        if !(MIN_FRAME_LEN..=MAX_RX_FRAME_LEN).contains(&len) {
            i += 1;
            continue;
        }
        let range = i..i + len;
        if range.end > buf.len() {
            incomplete = true;
        } else if !incomplete || decode(&buf[range.clone()]).is_ok() {
            return Some(range);
        }
        i += 1;
    }
    None
}
