//! Incremental decoder for JBD response frames
//!
//! Response layout: `DD <cmd> <status> <len> <data..len> <crc_hi> <crc_lo> 77`.
//! Notifications may split a frame across deliveries or carry several
//! frames at once, so the decoder accumulates bytes and yields every
//! complete frame it can find.

/// First byte of every frame
pub const FRAME_START: u8 = 0xDD;
/// Last byte of every frame
pub const FRAME_END: u8 = 0x77;

/// start + command + status + length
const HEADER_LEN: usize = 4;
/// crc (2) + end
const TRAILER_LEN: usize = 3;

/// Two's complement of the byte sum, truncated to 16 bits.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_sub(u16::from(*byte)))
}

/// A complete response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    /// Zero on success, anything else is a device-reported failure
    pub status: u8,
    pub payload: Vec<u8>,
    /// Checksum as received
    pub checksum: u16,
}

impl Frame {
    fn from_raw(raw: &[u8]) -> Self {
        let len = usize::from(raw[3]);
        let crc_at = HEADER_LEN + len;
        Self {
            command: raw[1],
            status: raw[2],
            payload: raw[HEADER_LEN..crc_at].to_vec(),
            checksum: u16::from_be_bytes([raw[crc_at], raw[crc_at + 1]]),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0x00
    }

    /// Whether the received checksum matches status, length and payload.
    pub fn checksum_matches(&self) -> bool {
        let mut covered = Vec::with_capacity(self.payload.len() + 2);
        covered.push(self.status);
        covered.push(self.payload.len() as u8);
        covered.extend_from_slice(&self.payload);
        checksum(&covered) == self.checksum
    }
}

/// Byte accumulating frame scanner
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every frame completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn next_frame(&mut self) -> Option<Frame> {
        // Each pass either returns or drops at least one byte.
        loop {
            match self.buffer.iter().position(|&byte| byte == FRAME_START) {
                Some(start) => {
                    self.buffer.drain(..start);
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let frame_len = HEADER_LEN + usize::from(self.buffer[3]) + TRAILER_LEN;
            if self.buffer.len() < frame_len {
                return None;
            }

            if self.buffer[frame_len - 1] != FRAME_END {
                self.buffer.drain(..1);
                continue;
            }

            let frame = Frame::from_raw(&self.buffer[..frame_len]);
            self.buffer.drain(..frame_len);
            return Some(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GARBAGE: [u8; 5] = [0x01, 0x77, 0x00, 0x42, 0xA5];
    const FRAME: [u8; 7] = [0xDD, 0xA5, 0x03, 0x00, 0xFD, 0x5E, 0x77];

    fn stream() -> Vec<u8> {
        GARBAGE.iter().chain(FRAME.iter()).copied().collect()
    }

    #[test]
    fn checksum_is_negative_sum() {
        assert_eq!(checksum(&[0x03, 0x00]), 0xFFFD);
        assert_eq!(checksum(&[]), 0x0000);
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02]), 0xFE00);
    }

    #[test]
    fn checksum_wraps_past_sixteen_bits() {
        // 258 * 0xFF = 0x100FE
        assert_eq!(checksum(&[0xFF; 258]), 0xFF02);
        // 257 * 0xFF = 0xFFFF
        assert_eq!(checksum(&[0xFF; 257]), 0x0001);
    }

    #[test]
    fn garbage_before_frame_is_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&stream());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, 0xA5);
        assert_eq!(frames[0].status, 0x03);
        assert!(frames[0].payload.is_empty());
        assert_eq!(frames[0].checksum, 0xFD5E);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn any_two_splits_decode_like_the_whole() {
        let bytes = stream();
        let whole = FrameDecoder::new().push(&bytes);

        for first in 0..=bytes.len() {
            for second in first..=bytes.len() {
                let mut decoder = FrameDecoder::new();
                let mut frames = decoder.push(&bytes[..first]);
                frames.extend(decoder.push(&bytes[first..second]));
                frames.extend(decoder.push(&bytes[second..]));
                assert_eq!(frames, whole, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn coalesced_frames_are_all_returned() {
        let first = [0xDD, 0x03, 0x00, 0x02, 0x01, 0x02, 0xFF, 0xFB, 0x77];
        let second = [0xDD, 0x04, 0x00, 0x01, 0x09, 0xFF, 0xF6, 0x77];
        let mut bytes = first.to_vec();
        bytes.extend_from_slice(&second);

        let frames = FrameDecoder::new().push(&bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, 0x03);
        assert_eq!(frames[0].payload, vec![0x01, 0x02]);
        assert_eq!(frames[1].command, 0x04);
        assert_eq!(frames[1].payload, vec![0x09]);
    }

    #[test]
    fn bad_end_sentinel_resynchronises_on_next_start() {
        // Length claims one data byte but the end sentinel is wrong; the real
        // frame starts right after.
        let mut bytes = vec![0xDD, 0x03, 0x00, 0x01, 0x10, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&FRAME);
        let frames = FrameDecoder::new().push(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].checksum, 0xFD5E);
    }

    #[test]
    fn partial_frame_waits_for_more_data() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&[0xDD, 0x03, 0x00]).is_empty());
        assert_eq!(decoder.buffered(), 3);
        assert!(decoder.push(&[0x01, 0x55]).is_empty());
        let frames = decoder.push(&[0xFF, 0xAA, 0x77]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![0x55]);
    }

    #[test]
    fn all_garbage_is_discarded() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&[0x00; 64]).is_empty());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn response_checksum_covers_status_length_and_data() {
        let payload = [0x05, 0x10];
        let crc = checksum(&[0x00, 0x02, 0x05, 0x10]).to_be_bytes();
        let bytes = [0xDD, 0x03, 0x00, 0x02, 0x05, 0x10, crc[0], crc[1], 0x77];
        let frames = FrameDecoder::new().push(&bytes);
        assert_eq!(frames[0].payload, payload.to_vec());
        assert!(frames[0].checksum_matches());
        assert!(frames[0].is_ok());
    }
}
