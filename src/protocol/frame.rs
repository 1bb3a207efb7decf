//! Frame extraction from the incoming byte stream.
//!
//! The wire carries length-prefixed frames (`length:u32le` followed by
//! `length` payload bytes). Reads arrive in arbitrary chunk sizes, so a
//! [`FrameBuffer`] accumulates bytes in a single `BytesMut` and runs a small
//! state machine:
//! - `WaitingForLength`: need at least 4 bytes
//! - `WaitingForPayload`: length parsed, need N more payload bytes
//!
//! A single `push` may therefore yield zero, one, or many complete frames;
//! the unconsumed tail stays buffered for the next read without extra copies.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Result, WorkerError};

/// Byte size of the frame length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame payload size (1 GB). A frame claiming more than this
/// means the stream has desynchronized.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1_073_741_824;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForLength,
    WaitingForPayload { length: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with default capacity and frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a frame buffer with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForLength,
            max_frame_size,
        }
    }

    /// Push a chunk of data and extract every complete frame it completes.
    ///
    /// Returns the extracted frame payloads in wire order. Partial trailing
    /// data is retained for the next push.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame's declared length exceeds the limit.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let length = self.buffer.get_u32_le();
                    if length > self.max_frame_size {
                        return Err(WorkerError::Protocol(format!(
                            "frame length {} exceeds maximum {}",
                            length, self.max_frame_size
                        )));
                    }
                    self.state = State::WaitingForPayload { length };
                }
                State::WaitingForPayload { length } => {
                    let length = length as usize;
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    let payload = self.buffer.split_to(length).freeze();
                    self.state = State::WaitingForLength;
                    return Ok(Some(payload));
                }
            }
        }
    }

    /// Number of buffered, not-yet-consumed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when no unconsumed bytes remain.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when the buffer holds a partial frame (length prefix consumed or
    /// partial bytes pending). Used to distinguish a clean EOF from one that
    /// cuts a frame in half.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix a payload with its little-endian length, producing one wire frame.
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&build_frame(b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert!(buffer.is_empty());
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut data = build_frame(b"first");
        data.extend(build_frame(b"second"));
        data.extend(build_frame(b"third"));

        let frames = buffer.push(&data).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"first");
        assert_eq!(&frames[1][..], b"second");
        assert_eq!(&frames[2][..], b"third");
    }

    #[test]
    fn test_empty_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&build_frame(b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_fragmented_length_prefix() {
        let mut buffer = FrameBuffer::new();
        let data = build_frame(b"test");

        assert!(buffer.push(&data[..2]).unwrap().is_empty());
        assert!(buffer.has_partial_frame());

        let frames = buffer.push(&data[2..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"test");
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let data = build_frame(b"a longer payload split mid-way");

        assert!(buffer.push(&data[..10]).unwrap().is_empty());
        assert!(buffer.has_partial_frame());

        let frames = buffer.push(&data[10..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"a longer payload split mid-way");
    }

    #[test]
    fn test_chunking_is_invariant() {
        // Same total stream split 1-byte-at-a-time, in 3-byte chunks, or as
        // one chunk must yield the identical frame sequence.
        let mut stream = Vec::new();
        for payload in [&b"alpha"[..], b"", b"gamma ray burst"] {
            stream.extend(build_frame(payload));
        }

        let collect = |chunk_size: usize| -> Vec<Bytes> {
            let mut buffer = FrameBuffer::new();
            let mut frames = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                frames.extend(buffer.push(chunk).unwrap());
            }
            assert!(!buffer.has_partial_frame());
            frames
        };

        let whole = collect(stream.len());
        assert_eq!(collect(1), whole);
        assert_eq!(collect(3), whole);
        assert_eq!(whole.len(), 3);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = FrameBuffer::with_max_frame_size(16);
        let result = buffer.push(&1024u32.to_le_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_frame_detection_after_length() {
        let mut buffer = FrameBuffer::new();
        // Full length prefix, no payload yet: the 4 prefix bytes are consumed
        // but a frame is pending.
        buffer.push(&8u32.to_le_bytes()).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.has_partial_frame());
    }
}
