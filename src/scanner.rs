//! Frame recovery from the free-running inventory stream.
//!
//! While continuously reading, the module pushes tag reports back to back
//! with no acknowledgement. Reads from the transport cut that stream at
//! arbitrary points and line noise can appear between frames, so frame
//! boundaries are found again by searching for the preamble.

use log::{debug, warn};

use crate::frame::{self, MAX_RX_FRAME_LEN, MIN_FRAME_LEN, PREAMBLE};
use crate::inventory::{Inventory, MergeOutcome};
use crate::tag;

/// Result of scanning one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Leading bytes fully processed. Anything after belongs to a frame still arriving.
    pub consumed: usize,
    /// Frames decoded into tag records
    pub frames: usize,
    /// Decoded records that were new EPCs
    pub new_tags: usize,
    /// Complete frames skipped because they failed validation or tag decoding
    pub rejected: usize,
    /// Noise bytes stepped over while resynchronising
    pub skipped: usize,
    /// The scan stopped because the inventory reached its capacity
    pub inventory_full: bool,
}

/// Running totals kept by a `StreamScanner`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub frames: usize,
    pub rejected: usize,
    pub skipped: usize,
}

/// Scan `buf` for tag-report frames and merge every decoded tag into `inventory`.
///
/// A non-matching byte advances the scan by one; a complete frame advances it
/// by its declared length whether or not it decoded. A frame whose header or
/// body has not fully arrived stops the scan so it can be completed by the
/// next read. Once the inventory is full the rest of the buffer is consumed
/// without being examined.
pub fn scan(buf: &[u8], inventory: &mut Inventory) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut i = 0;

    while i < buf.len() {
        if inventory.is_full() {
            debug!("Inventory full, discarding {} stream bytes", buf.len() - i);
            outcome.inventory_full = true;
            i = buf.len();
            break;
        }

        if buf[i] != PREAMBLE[0] {
            i += 1;
            outcome.skipped += 1;
            continue;
        }
        let Some(&second) = buf.get(i + 1) else {
            break;
        };
        if second != PREAMBLE[1] {
            i += 1;
            outcome.skipped += 1;
            continue;
        }

        let Some(frame_len) = frame::declared_len(&buf[i..]) else {
            break;
        };
        if !(MIN_FRAME_LEN..=MAX_RX_FRAME_LEN).contains(&frame_len) {
            i += 1;
            outcome.skipped += 1;
            continue;
        }
        if i + frame_len > buf.len() {
            break;
        }

        let bytes = &buf[i..i + frame_len];
        match frame::decode(bytes) {
            Ok(response) => match tag::decode_tag(response.body()) {
                Ok(tag) => {
                    outcome.frames += 1;
                    if let MergeOutcome::Inserted(_) = inventory.merge(tag) {
                        outcome.new_tags += 1;
                    }
                }
                Err(e) => {
                    debug!(
                        "Skipping non-tag frame (opcode {:#04x}): {}",
                        response.opcode(),
                        e
                    );
                    outcome.rejected += 1;
                }
            },
            Err(e) => {
                warn!("Skipping corrupt frame at stream offset {}: {}", i, e);
                outcome.rejected += 1;
            }
        }
        i += frame_len;
    }

    outcome.consumed = i;
    outcome
}

/// Carries unconsumed stream bytes from one read to the next.
#[derive(Debug, Default)]
pub struct StreamScanner {
    pending: Vec<u8>,
    stats: ScanStats,
}

impl StreamScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes and scan everything not yet consumed
    pub fn feed(&mut self, bytes: &[u8], inventory: &mut Inventory) -> ScanOutcome {
        self.pending.extend_from_slice(bytes);
        let outcome = scan(&self.pending, inventory);
        self.pending.drain(..outcome.consumed);

        self.stats.frames += outcome.frames;
        self.stats.rejected += outcome.rejected;
        self.stats.skipped += outcome.skipped;
        outcome
    }

    /// Bytes of a partially received frame awaiting the next read
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Drop pending bytes and totals before a new scan
    pub fn reset(&mut self) {
        self.pending.clear();
        self.stats = ScanStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode;

    fn tag_frame(epc: &[u8], rssi: i16) -> Vec<u8> {
        let pc = ((epc.len() / 2) as u16) << 11;
        let mut params = pc.to_be_bytes().to_vec();
        params.extend_from_slice(epc);
        params.extend_from_slice(&rssi.to_be_bytes());
        encode(0x83, &params).unwrap()
    }

    const EPC_A: [u8; 12] = [
        0xE2, 0x00, 0x00, 0x17, 0x22, 0x09, 0x01, 0x23, 0x19, 0x10, 0x01, 0x23,
    ];
    const EPC_B: [u8; 12] = [
        0xE2, 0x00, 0x00, 0x17, 0x22, 0x09, 0x01, 0x23, 0x19, 0x10, 0x01, 0x24,
    ];

    #[test]
    fn test_scan_resyncs_over_garbage() {
        let mut buf = vec![0x42];
        buf.extend(tag_frame(&EPC_A, -600));
        buf.push(0x17);
        buf.extend(tag_frame(&EPC_B, -550));

        let mut inventory = Inventory::with_capacity(8);
        let outcome = scan(&buf, &mut inventory);

        assert_eq!(outcome.frames, 2);
        assert_eq!(outcome.new_tags, 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(outcome.consumed, buf.len());
        assert_eq!(inventory.get(0).unwrap().epc, EPC_A);
        assert_eq!(inventory.get(1).unwrap().epc, EPC_B);
        assert_eq!(inventory.get(1).unwrap().rssi, -55.0);
    }

    #[test]
    fn test_scan_stops_at_partial_frame() {
        let first = tag_frame(&EPC_A, -600);
        let second = tag_frame(&EPC_B, -600);
        let mut buf = first.clone();
        buf.extend_from_slice(&second[..10]);

        let mut inventory = Inventory::with_capacity(8);
        let outcome = scan(&buf, &mut inventory);

        assert_eq!(outcome.consumed, first.len());
        assert_eq!(outcome.frames, 1);
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_scan_keeps_split_header() {
        let frame = tag_frame(&EPC_A, -600);
        let mut inventory = Inventory::with_capacity(8);

        assert_eq!(scan(&frame[..1], &mut inventory).consumed, 0);
        assert_eq!(scan(&frame[..3], &mut inventory).consumed, 0);
        assert!(inventory.is_empty());
    }

    #[test]
    fn test_scan_skips_corrupt_frame_and_continues() {
        let mut corrupt = tag_frame(&EPC_A, -600);
        corrupt[10] ^= 0x01;
        let good = tag_frame(&EPC_B, -600);
        let mut buf = corrupt.clone();
        buf.extend_from_slice(&good);

        let mut inventory = Inventory::with_capacity(8);
        let outcome = scan(&buf, &mut inventory);

        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.consumed, buf.len());
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.get(0).unwrap().epc, EPC_B);
    }

    #[test]
    fn test_scan_skips_ack_frames() {
        // acknowledgement of the start command arriving ahead of the tag reports
        let mut buf = encode(0x82, &[0x01]).unwrap();
        buf.extend(tag_frame(&EPC_A, -600));

        let mut inventory = Inventory::with_capacity(8);
        let outcome = scan(&buf, &mut inventory);

        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.frames, 1);
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_scan_implausible_length_advances_one_byte() {
        let mut buf = vec![0xA5, 0x5A, 0x00, 0x00];
        buf.extend(tag_frame(&EPC_A, -600));

        let mut inventory = Inventory::with_capacity(8);
        let outcome = scan(&buf, &mut inventory);

        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.skipped, 4);
        assert_eq!(outcome.consumed, buf.len());
    }

    #[test]
    fn test_scan_merges_repeat_sightings() {
        let mut buf = tag_frame(&EPC_A, -700);
        buf.extend(tag_frame(&EPC_A, -500));
        buf.extend(tag_frame(&EPC_A, -650));

        let mut inventory = Inventory::with_capacity(8);
        let outcome = scan(&buf, &mut inventory);

        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.new_tags, 1);
        let entry = inventory.get(0).unwrap();
        assert_eq!(entry.read_count, 3);
        assert_eq!(entry.rssi, -50.0);
    }

    #[test]
    fn test_scan_stops_when_inventory_full() {
        let mut buf = tag_frame(&EPC_A, -600);
        buf.extend(tag_frame(&EPC_B, -600));
        buf.extend(tag_frame(&EPC_A, -600));

        let mut inventory = Inventory::with_capacity(1);
        let outcome = scan(&buf, &mut inventory);

        assert!(outcome.inventory_full);
        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.consumed, buf.len());
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.get(0).unwrap().read_count, 1);
    }

    #[test]
    fn test_stream_scanner_reassembles_fragments() {
        let mut stream = vec![0x00];
        stream.extend(tag_frame(&EPC_A, -600));
        stream.extend(tag_frame(&EPC_B, -610));
        stream.extend(tag_frame(&EPC_A, -590));

        let mut scanner = StreamScanner::new();
        let mut inventory = Inventory::with_capacity(8);
        for chunk in stream.chunks(5) {
            scanner.feed(chunk, &mut inventory);
        }

        assert!(scanner.pending().is_empty());
        assert_eq!(scanner.stats().frames, 3);
        assert_eq!(scanner.stats().skipped, 1);
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.get(0).unwrap().read_count, 2);
        assert_eq!(inventory.get(0).unwrap().rssi, -59.0);
    }

    #[test]
    fn test_stream_scanner_byte_at_a_time() {
        let frame = tag_frame(&EPC_B, -600);
        let mut scanner = StreamScanner::new();
        let mut inventory = Inventory::with_capacity(8);
        for (n, byte) in frame.iter().enumerate() {
            let outcome = scanner.feed(&[*byte], &mut inventory);
            if n + 1 < frame.len() {
                assert_eq!(outcome.frames, 0);
            } else {
                assert_eq!(outcome.frames, 1);
            }
        }
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_stream_scanner_reset() {
        let frame = tag_frame(&EPC_A, -600);
        let mut scanner = StreamScanner::new();
        let mut inventory = Inventory::with_capacity(8);
        scanner.feed(&frame[..6], &mut inventory);
        assert_eq!(scanner.pending().len(), 6);

        scanner.reset();
        assert!(scanner.pending().is_empty());
        assert_eq!(scanner.stats(), ScanStats::default());
    }
}
