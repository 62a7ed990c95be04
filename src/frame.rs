// MIT License - Copyright (c) 2026 Peter Wright
// Panel frame codec

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::constants::{MAX_PAYLOAD_LEN, MIN_FRAME_LEN};
use crate::error::{GatewayError, Result};

/// Sum-of-bytes checksum used by the panel (modulo 256).
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// One complete protocol message.
///
/// Wire layout: `[code][len][payload...][checksum]` where `len` is the total
/// frame length and the checksum covers every preceding byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    code: u8,
    payload: Bytes,
}

impl Frame {
    /// Build a frame, rejecting payloads the length byte cannot describe.
    pub fn new(code: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(GatewayError::MalformedFrame {
                details: format!(
                    "payload of {} bytes exceeds {} byte limit",
                    payload.len(),
                    MAX_PAYLOAD_LEN
                ),
            });
        }
        Ok(Self { code, payload })
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total encoded length, including header and checksum.
    pub fn len(&self) -> usize {
        self.payload.len() + MIN_FRAME_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The checksum this frame carries on the wire.
    pub fn checksum(&self) -> u8 {
        let header = [self.code, self.len() as u8];
        checksum(&header).wrapping_add(checksum(&self.payload))
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_u8(self.code);
        buf.put_u8(self.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_u8(self.checksum());
        buf.freeze()
    }

    /// Parse exactly one frame from `data`.
    ///
    /// The buffer must hold the whole frame and nothing else.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_FRAME_LEN {
            return Err(GatewayError::MalformedFrame {
                details: format!("{} bytes is shorter than a frame header", data.len()),
            });
        }
        let declared = data[1] as usize;
        if declared != data.len() {
            return Err(GatewayError::MalformedFrame {
                details: format!("length byte says {} but got {} bytes", declared, data.len()),
            });
        }
        let (body, trailer) = data.split_at(data.len() - 1);
        let expected = checksum(body);
        let actual = trailer[0];
        if expected != actual {
            return Err(GatewayError::FrameChecksumMismatch { expected, actual });
        }
        Ok(Self {
            code: data[0],
            payload: Bytes::copy_from_slice(&body[2..]),
        })
    }
}

/// Reassembles frames from a byte stream that may split or merge them.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
    /// Set after a bad frame until the next good one; further bad candidates
    /// are stray bytes of the same fault and are not reported again.
    resyncing: bool,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered (used after a session ends).
    pub fn clear(&mut self) {
        self.buf.clear();
        self.resyncing = false;
    }

    /// Extract the next frame, if a complete one is buffered.
    ///
    /// A frame that fails to decode costs one byte, not its declared length,
    /// so a corrupted length byte cannot swallow the frames behind it. The
    /// first failure is returned (`FrameChecksumMismatch` or `MalformedFrame`)
    /// so callers can count drops; the stray bytes after it are skipped quietly.
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            if self.buf.len() < MIN_FRAME_LEN {
                return None;
            }
            let declared = self.buf[1] as usize;
            if declared < MIN_FRAME_LEN {
                // Impossible length byte: we are out of step, slide by one.
                debug!("Resync: dropping byte 0x{:02X}", self.buf[0]);
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < declared {
                // While out of step, a garbage length must not stall a good
                // frame that is already buffered further on.
                if self.resyncing {
                    if let Some(offset) = self.next_valid_offset() {
                        debug!("Resync: skipping {} bytes", offset);
                        self.buf.advance(offset);
                        continue;
                    }
                }
                return None;
            }
            match Frame::decode(&self.buf[..declared]) {
                Ok(frame) => {
                    self.buf.advance(declared);
                    self.resyncing = false;
                    return Some(Ok(frame));
                }
                Err(e) => {
                    self.buf.advance(1);
                    if self.resyncing {
                        continue;
                    }
                    self.resyncing = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Offset (from 1) of the first complete, checksum-valid frame in the buffer.
    fn next_valid_offset(&self) -> Option<usize> {
        (1..self.buf.len()).find(|&offset| {
            let rest = &self.buf[offset..];
            rest.len() >= MIN_FRAME_LEN
                && (rest[1] as usize) >= MIN_FRAME_LEN
                && (rest[1] as usize) <= rest.len()
                && Frame::decode(&rest[..rest[1] as usize]).is_ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02]), 0x03);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(0x50, vec![0x01]).unwrap();
        let wire = frame.encode();
        assert_eq!(&wire[..], &[0x50, 0x04, 0x01, 0x55]);
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.checksum(), 0x55);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut wire = Frame::new(0x52, vec![0x00, 0x10]).unwrap().encode().to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        match Frame::decode(&wire) {
            Err(GatewayError::FrameChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let wire = [0x52, 0x09, 0x00, 0x5B];
        assert!(matches!(
            Frame::decode(&wire),
            Err(GatewayError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_payload_limit() {
        assert!(Frame::new(0x01, vec![0u8; MAX_PAYLOAD_LEN]).is_ok());
        assert!(Frame::new(0x01, vec![0u8; MAX_PAYLOAD_LEN + 1]).is_err());
    }

    #[test]
    fn test_reader_split_and_merged_frames() {
        let a = Frame::new(0x10, vec![0x00]).unwrap();
        let b = Frame::new(0x52, vec![0x01, 0x02, 0x03]).unwrap();
        let mut stream = a.encode().to_vec();
        stream.extend_from_slice(&b.encode());

        let mut reader = FrameReader::new();
        reader.push(&stream[..2]);
        assert!(reader.next_frame().is_none());
        reader.push(&stream[2..]);
        assert_eq!(reader.next_frame().unwrap().unwrap(), a);
        assert_eq!(reader.next_frame().unwrap().unwrap(), b);
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_drops_corrupt_frame_and_continues() {
        let good = Frame::new(0x52, vec![0x01]).unwrap();
        let mut corrupt = Frame::new(0x52, vec![0x02]).unwrap().encode().to_vec();
        corrupt[2] = 0x7F;
        let mut reader = FrameReader::new();
        reader.push(&corrupt);
        reader.push(&good.encode());
        assert!(matches!(
            reader.next_frame(),
            Some(Err(GatewayError::FrameChecksumMismatch { .. }))
        ));
        assert_eq!(reader.next_frame().unwrap().unwrap(), good);
    }

    #[test]
    fn test_reader_recovers_after_corrupted_length_byte() {
        let a = Frame::new(0x52, vec![0x01]).unwrap();
        let b = Frame::new(0x10, vec![0x00]).unwrap();
        let c = Frame::new(0x20, vec![0x01, 0x02]).unwrap();
        let mut stream = a.encode().to_vec();
        stream[1] = 6;
        stream.extend_from_slice(&b.encode());
        stream.extend_from_slice(&c.encode());

        let mut reader = FrameReader::new();
        reader.push(&stream);
        assert!(matches!(
            reader.next_frame(),
            Some(Err(GatewayError::FrameChecksumMismatch { .. }))
        ));
        assert_eq!(reader.next_frame().unwrap().unwrap(), b);
        assert_eq!(reader.next_frame().unwrap().unwrap(), c);
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_reports_one_drop_per_fault() {
        // The tail of a bad frame is skipped without further errors, and the
        // next fault after a good frame is reported again.
        let good = Frame::new(0x52, vec![0x00, 0x00, 0x00]).unwrap();
        let mut bad = Frame::new(0x52, vec![0x00, 0x00, 0x00]).unwrap().encode().to_vec();
        let last = bad.len() - 1;
        bad[last] = bad[last].wrapping_add(1);

        let mut reader = FrameReader::new();
        reader.push(&bad);
        reader.push(&good.encode());
        reader.push(&bad);
        reader.push(&good.encode());

        let mut drops = 0;
        let mut frames = Vec::new();
        while let Some(next) = reader.next_frame() {
            match next {
                Ok(frame) => frames.push(frame),
                Err(_) => drops += 1,
            }
        }
        assert_eq!(drops, 2);
        assert_eq!(frames, vec![good.clone(), good]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_skips_bytes_that_cannot_start_a_frame() {
        // Junk whose "length" bytes are all below the minimum gets skipped one by one.
        let good = Frame::new(0x01, vec![]).unwrap();
        let mut reader = FrameReader::new();
        reader.push(&[0xFF, 0x00]);
        reader.push(&good.encode());
        assert_eq!(reader.next_frame().unwrap().unwrap(), good);
        assert_eq!(reader.buffered(), 0);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(code in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_LEN)) {
            let frame = Frame::new(code, payload).unwrap();
            prop_assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
        }
    }
}
