//! Growable byte buffer with explicit read/write cursors and packet framing.
//!
//! All multi-byte integers are big-endian. A packet frame on the wire is
//! `opcode: u8 | length: u16 | payload`, where `length` counts payload bytes only.

use crate::error::{BufferError, BufferResult};

/// Size of the `opcode | length` prefix in front of every packet payload.
pub const FRAME_HEADER_SIZE: usize = 3;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Payload space guaranteed by [`FramedBuffer::begin_packet`].
pub const FRAME_HEADROOM: usize = 256;

#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    opcode: u8,
    length_pos: usize,
}

/// A decoded packet frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Byte buffer with independent read and write cursors.
///
/// Reads never go past the write cursor. While a packet frame is open the
/// buffer refuses to grow, so a frame is always written into stable storage.
#[derive(Debug, Clone)]
pub struct FramedBuffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    frame: Option<OpenFrame>,
}

impl Default for FramedBuffer {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl FramedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
            frame: None,
        }
    }

    /// Creates a buffer whose readable region is exactly `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            read_pos: 0,
            write_pos: bytes.len(),
            frame: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    /// Number of bytes between the read and write cursors.
    pub fn remaining(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn is_frame_open(&self) -> bool {
        self.frame.is_some()
    }

    /// Everything written so far, from the buffer origin.
    pub fn written(&self) -> &[u8] {
        &self.data[..self.write_pos]
    }

    /// The unread bytes.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Rewinds both cursors to the origin. Capacity is retained and any open
    /// frame is discarded.
    pub fn reset_cursors(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.frame = None;
    }

    /// Moves the unread bytes to the origin so the consumed prefix can be reused.
    pub fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    /// Skips `count` unread bytes.
    pub fn skip(&mut self, count: usize) -> BufferResult<()> {
        self.check_read(count)?;
        self.read_pos += count;
        Ok(())
    }

    fn check_read(&self, requested: usize) -> BufferResult<()> {
        let available = self.remaining();
        if requested > available {
            return Err(BufferError::TruncatedInput {
                requested,
                available,
            });
        }
        Ok(())
    }

    fn reserve(&mut self, requested: usize) -> BufferResult<()> {
        let remaining = self.data.len() - self.write_pos;
        if requested <= remaining {
            return Ok(());
        }
        if self.frame.is_some() {
            return Err(BufferError::FrameOverflow {
                requested,
                remaining,
            });
        }
        let needed = self.write_pos + requested;
        let grown = needed.max(self.data.len() * 2);
        self.data.resize(grown, 0);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> BufferResult<()> {
        self.write_block(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> BufferResult<()> {
        self.write_block(&value.to_be_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> BufferResult<()> {
        self.write_block(&value.to_be_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> BufferResult<()> {
        self.write_block(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> BufferResult<()> {
        self.write_block(&value.to_be_bytes())
    }

    pub fn write_block(&mut self, bytes: &[u8]) -> BufferResult<()> {
        self.reserve(bytes.len())?;
        let end = self.write_pos + bytes.len();
        self.data[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
        Ok(())
    }

    /// Writes a string as a `u8` length prefix followed by its UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> BufferResult<()> {
        let bytes = value.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(BufferError::Overflow {
                length: bytes.len(),
                max: u8::MAX as usize,
            });
        }
        self.write_u8(bytes.len() as u8)?;
        self.write_block(bytes)
    }

    pub fn read_u8(&mut self) -> BufferResult<u8> {
        self.check_read(1)?;
        let value = self.data[self.read_pos];
        self.read_pos += 1;
        Ok(value)
    }

    pub fn read_i8(&mut self) -> BufferResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> BufferResult<u16> {
        let bytes = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_i16(&mut self) -> BufferResult<i16> {
        let bytes = self.read_array::<2>()?;
        Ok(i16::from_be_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> BufferResult<i32> {
        let bytes = self.read_array::<4>()?;
        Ok(i32::from_be_bytes(bytes))
    }

    fn read_array<const N: usize>(&mut self) -> BufferResult<[u8; N]> {
        self.check_read(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.read_pos..self.read_pos + N]);
        self.read_pos += N;
        Ok(out)
    }

    pub fn read_block(&mut self, len: usize) -> BufferResult<Vec<u8>> {
        self.check_read(len)?;
        let block = self.data[self.read_pos..self.read_pos + len].to_vec();
        self.read_pos += len;
        Ok(block)
    }

    /// Reads a `u8`-length-prefixed string of at most `max_len` bytes.
    ///
    /// The declared length is checked against `max_len` before any of the
    /// string body is touched.
    pub fn read_length_prefixed_string(&mut self, max_len: usize) -> BufferResult<String> {
        let length = self.read_u8()? as usize;
        if length > max_len {
            return Err(BufferError::Overflow {
                length,
                max: max_len,
            });
        }
        let bytes = self.read_block(length)?;
        String::from_utf8(bytes).map_err(|_| BufferError::InvalidString)
    }

    /// Stages a packet with the given opcode. The length is back-filled by
    /// [`end_packet`](Self::end_packet).
    ///
    /// The header plus [`FRAME_HEADROOM`] payload bytes are reserved up front;
    /// once the frame is open the buffer will not grow until it is closed.
    pub fn begin_packet(&mut self, opcode: u8) -> BufferResult<()> {
        if let Some(frame) = self.frame {
            return Err(BufferError::FrameAlreadyOpen {
                opcode: frame.opcode,
            });
        }
        self.reserve(FRAME_HEADER_SIZE + FRAME_HEADROOM)?;
        self.write_u8(opcode)?;
        let length_pos = self.write_pos;
        self.write_u16(0)?;
        self.frame = Some(OpenFrame { opcode, length_pos });
        Ok(())
    }

    /// Finalises the open frame, writing its payload length.
    pub fn end_packet(&mut self) -> BufferResult<()> {
        let frame = self.frame.take().ok_or(BufferError::NoOpenFrame)?;
        let payload = self.write_pos - frame.length_pos - 2;
        if payload > MAX_FRAME_PAYLOAD {
            return Err(BufferError::Overflow {
                length: payload,
                max: MAX_FRAME_PAYLOAD,
            });
        }
        let bytes = (payload as u16).to_be_bytes();
        self.data[frame.length_pos..frame.length_pos + 2].copy_from_slice(&bytes);
        Ok(())
    }

    /// Writes a complete frame, growing the buffer first so the payload fits.
    pub fn write_frame(&mut self, opcode: u8, payload: &[u8]) -> BufferResult<()> {
        if let Some(frame) = self.frame {
            return Err(BufferError::FrameAlreadyOpen {
                opcode: frame.opcode,
            });
        }
        self.reserve(FRAME_HEADER_SIZE + payload.len())?;
        self.begin_packet(opcode)?;
        if let Err(err) = self.write_block(payload) {
            self.abort_packet();
            return Err(err);
        }
        self.end_packet()
    }

    /// Discards the open frame, rewinding the write cursor to where it began.
    pub fn abort_packet(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.write_pos = frame.length_pos - 1;
        }
    }

    /// Reads the next complete frame, if one is fully buffered.
    ///
    /// Returns `Ok(None)` and consumes nothing when only part of a frame has
    /// arrived.
    pub fn read_frame(&mut self) -> BufferResult<Option<Frame>> {
        if self.remaining() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let header = &self.data[self.read_pos..self.read_pos + FRAME_HEADER_SIZE];
        let opcode = header[0];
        let length = u16::from_be_bytes([header[1], header[2]]) as usize;
        if self.remaining() < FRAME_HEADER_SIZE + length {
            return Ok(None);
        }
        self.read_pos += FRAME_HEADER_SIZE;
        let payload = self.read_block(length)?;
        Ok(Some(Frame { opcode, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut buf = FramedBuffer::with_capacity(8);
        buf.write_u16(0x0102).unwrap();
        buf.write_i32(-2).unwrap();
        assert_eq!(buf.written(), &[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(buf.read_u16().unwrap(), 0x0102);
        assert_eq!(buf.read_i32().unwrap(), -2);
    }

    #[test]
    fn test_grows_outside_a_frame() {
        let mut buf = FramedBuffer::with_capacity(2);
        buf.write_block(&[1, 2, 3, 4, 5]).unwrap();
        assert!(buf.capacity() >= 5);
        assert_eq!(buf.unread(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_refuses_to_grow_inside_a_frame() {
        let mut buf = FramedBuffer::with_capacity(0);
        buf.begin_packet(1).unwrap();
        buf.write_block(&[7; FRAME_HEADROOM]).unwrap();
        let err = buf.write_u8(8).unwrap_err();
        assert_eq!(
            err,
            BufferError::FrameOverflow {
                requested: 1,
                remaining: 0
            }
        );
    }

    #[test]
    fn test_read_past_write_cursor_is_truncated() {
        let mut buf = FramedBuffer::from_bytes(&[1, 2]);
        assert_eq!(
            buf.read_i32().unwrap_err(),
            BufferError::TruncatedInput {
                requested: 4,
                available: 2
            }
        );
        // a failed read consumes nothing
        assert_eq!(buf.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_string_over_max_len_is_overflow() {
        let mut buf = FramedBuffer::default();
        buf.write_string("administrator").unwrap();
        assert_eq!(
            buf.read_length_prefixed_string(12).unwrap_err(),
            BufferError::Overflow { length: 13, max: 12 }
        );
    }

    #[test]
    fn test_declared_string_length_beyond_data_is_truncated() {
        let mut buf = FramedBuffer::from_bytes(&[10, b'a', b'b']);
        assert!(matches!(
            buf.read_length_prefixed_string(20),
            Err(BufferError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = FramedBuffer::default();
        buf.write_string("zezima").unwrap();
        assert_eq!(buf.read_length_prefixed_string(12).unwrap(), "zezima");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut buf = FramedBuffer::with_capacity(16);
        buf.write_block(&[0; 40]).unwrap();
        let capacity = buf.capacity();
        buf.read_u8().unwrap();
        buf.reset_cursors();
        assert_eq!(buf.read_position(), 0);
        assert_eq!(buf.write_position(), 0);
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn test_frame_length_is_back_filled() {
        let mut buf = FramedBuffer::default();
        buf.begin_packet(253).unwrap();
        buf.write_block(&[9, 9, 9]).unwrap();
        buf.end_packet().unwrap();
        assert_eq!(buf.written(), &[253, 0, 3, 9, 9, 9]);
    }

    #[test]
    fn test_nested_frames_are_rejected() {
        let mut buf = FramedBuffer::default();
        buf.begin_packet(1).unwrap();
        assert_eq!(
            buf.begin_packet(2).unwrap_err(),
            BufferError::FrameAlreadyOpen { opcode: 1 }
        );
        buf.end_packet().unwrap();
        assert_eq!(buf.end_packet().unwrap_err(), BufferError::NoOpenFrame);
    }

    #[test]
    fn test_aborted_frame_leaves_no_bytes() {
        let mut buf = FramedBuffer::default();
        buf.write_u8(1).unwrap();
        buf.begin_packet(44).unwrap();
        buf.write_u16(5).unwrap();
        buf.abort_packet();
        assert!(!buf.is_frame_open());
        assert_eq!(buf.written(), &[1]);
    }

    #[test]
    fn test_empty_buffer_frames_delete_ground_item() {
        let mut buf = FramedBuffer::with_capacity(0);
        buf.begin_packet(156).unwrap();
        buf.write_u8(crate::protocol::pack_position(3, 4)).unwrap();
        buf.write_u16(995).unwrap();
        buf.end_packet().unwrap();
        assert_eq!(buf.written(), &[156, 0, 3, 0x34, 0x03, 0xE3]);

        let frame = buf.read_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 156);
        let mut payload = FramedBuffer::from_bytes(&frame.payload);
        let packed = payload.read_u8().unwrap();
        assert_eq!(crate::protocol::unpack_position(packed), (3, 4));
        assert_eq!(payload.read_u16().unwrap(), 995);
        assert_eq!(payload.remaining(), 0);
    }

    #[test]
    fn test_whole_frame_grows_buffer_up_front() {
        let mut buf = FramedBuffer::with_capacity(4);
        buf.write_frame(81, &[7; 40]).unwrap();
        let frame = buf.read_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 81);
        assert_eq!(frame.payload.len(), 40);
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let mut buf = FramedBuffer::from_bytes(&[4, 0, 3, 1]);
        assert_eq!(buf.read_frame().unwrap(), None);
        assert_eq!(buf.read_position(), 0);
        buf.write_block(&[2, 3]).unwrap();
        let frame = buf.read_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 4);
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_compact_moves_unread_to_origin() {
        let mut buf = FramedBuffer::from_bytes(&[1, 2, 3, 4]);
        buf.skip(3).unwrap();
        buf.compact();
        assert_eq!(buf.read_position(), 0);
        assert_eq!(buf.unread(), &[4]);
    }
}
