//! Frame Protocol
//!
//! Wire format for control requests and replies: length-prefixed JSON with a
//! CRC32 checksum.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)                  |
//! | big-endian u32 | CRC32          | ControlRequest or ControlResponse        |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! The Length field counts the JSON payload only.
//!
//! # Recovery
//!
//! A frame whose checksum or JSON is bad is consumed before the error is
//! returned, so the next frame on the same stream decodes normally. An
//! oversize length prefix cannot be skipped (the payload boundary is
//! untrustworthy) and leaves the decoder poisoned until [`FrameDecoder::clear`].

use serde::{de::DeserializeOwned, Serialize};

use super::TransportError;

/// Maximum payload size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 1024;

/// Frame header size: 4 bytes length + 4 bytes checksum
pub const HEADER_SIZE: usize = 8;

#[inline]
fn compute_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Wrap an already-serialized payload in a frame header
///
/// # Errors
///
/// [`TransportError::FrameTooLarge`] when the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode_raw(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let len = payload.len() as u32;
    let checksum = compute_checksum(payload);

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encode a message to a length-prefixed frame with CRC32 checksum
///
/// # Errors
///
/// Returns `TransportError::SerializationError` if JSON serialization fails,
/// or `TransportError::FrameTooLarge` if the payload exceeds `MAX_FRAME_SIZE`.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json =
        serde_json::to_vec(msg).map_err(|e| TransportError::SerializationError(e.to_string()))?;
    encode_raw(&json)
}

/// Decoder state machine for streaming frame parsing
///
/// Buffers incoming bytes and yields complete messages.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of bytes available in the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame
    ///
    /// Returns:
    /// - `Ok(Some(msg))` if a complete frame was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(TransportError::ChecksumMismatch)` for a corrupted frame (skipped)
    /// - `Err(TransportError::SerializationError)` for bad JSON (skipped)
    /// - `Err(TransportError::FrameTooLarge)` for an oversize length prefix
    ///
    /// # Errors
    ///
    /// See above. Only `FrameTooLarge` leaves the stream unrecoverable.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let available = self.available();

        // Need at least 8 bytes for header (length + checksum)
        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        // Validate frame size before waiting for (or allocating) the payload
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        // Need more data for payload
        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload_start = self.read_pos + HEADER_SIZE;
        let payload_end = payload_start + len;

        // Consume the frame up front; a bad payload must not block the next one
        self.read_pos = payload_end;
        let payload = &self.buffer[payload_start..payload_end];

        let actual_checksum = compute_checksum(payload);
        if actual_checksum != expected_checksum {
            return Err(TransportError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }

        serde_json::from_slice(payload)
            .map(Some)
            .map_err(|e| TransportError::SerializationError(e.to_string()))
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        op: String,
        seq: u32,
    }

    fn sample(seq: u32) -> Sample {
        Sample {
            op: "get_status".to_string(),
            seq,
        }
    }

    fn raw_frame(payload: &[u8], checksum: u32) -> Vec<u8> {
        let mut buf = (payload.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_frame_layout() {
        let encoded = encode(&sample(1)).unwrap();
        let payload_len =
            u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(payload_len, encoded.len() - HEADER_SIZE);

        let checksum = u32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(checksum, crc32fast::hash(&encoded[HEADER_SIZE..]));
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let encoded = encode(&sample(7)).unwrap();
        let mut decoder = FrameDecoder::new();

        for byte in &encoded[..encoded.len() - 1] {
            decoder.push(std::slice::from_ref(byte));
            assert!(decoder.decode::<Sample>().unwrap().is_none());
        }
        decoder.push(&encoded[encoded.len() - 1..]);
        assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(7)));
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut encoded = encode(&sample(1)).unwrap();
        encoded.extend(encode(&sample(2)).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&encoded);

        assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(1)));
        assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(2)));
        assert!(decoder.decode::<Sample>().unwrap().is_none());
    }

    #[test]
    fn test_checksum_mismatch_skips_frame() {
        let payload = br#"{"op":"get_status","seq":1}"#;
        let mut bytes = raw_frame(payload, 0xDEAD_BEEF);
        bytes.extend(encode(&sample(2)).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert!(matches!(
            decoder.decode::<Sample>(),
            Err(TransportError::ChecksumMismatch { .. })
        ));
        assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(2)));
    }

    #[test]
    fn test_invalid_json_skips_frame() {
        let payload = b"not valid json";
        let mut bytes = raw_frame(payload, crc32fast::hash(payload));
        bytes.extend(encode(&sample(3)).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert!(matches!(
            decoder.decode::<Sample>(),
            Err(TransportError::SerializationError(_))
        ));
        assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(3)));
    }

    #[test]
    fn test_oversize_length_rejected_before_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes());
        decoder.push(&[0u8; 4]);

        assert!(matches!(
            decoder.decode::<Sample>(),
            Err(TransportError::FrameTooLarge { .. })
        ));
        decoder.clear();
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_encode_too_large() {
        let payload = vec![b'x'; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_raw(&payload),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_compaction_keeps_pending_bytes() {
        let mut decoder = FrameDecoder::new();
        let frame = encode(&sample(9)).unwrap();
        for _ in 0..200 {
            decoder.push(&frame);
            assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(9)));
        }
        decoder.push(&frame[..5]);
        decoder.push(&frame[5..]);
        assert_eq!(decoder.decode::<Sample>().unwrap(), Some(sample(9)));
    }
}
