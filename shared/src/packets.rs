//! Game packets exchanged after login.
//!
//! Outbound packets are staged into a [`FramedBuffer`] with
//! [`OutboundPacket::send`]; inbound frames are decoded from their payload with
//! [`InboundPacket::decode`].

use crate::buffer::FramedBuffer;
use crate::error::{BufferError, BufferResult};

pub mod opcodes {
    // server -> client
    pub const SPAWN_GROUND_ITEM: u8 = 44;
    pub const REGION_CHANGE: u8 = 73;
    pub const ENTITY_UPDATE: u8 = 81;
    pub const PLACEMENT_BASE: u8 = 85;
    pub const DELETE_GROUND_ITEM: u8 = 156;
    pub const SYSTEM_MESSAGE: u8 = 253;

    // client -> server
    pub const CHAT: u8 = 4;
    pub const FOLLOW: u8 = 139;
    pub const WALK: u8 = 164;
}

/// Most waypoints a single walk request may carry.
pub const MAX_WALK_WAYPOINTS: usize = 25;
pub const MAX_CHAT_CHARS: usize = 80;
pub const MAX_SYSTEM_MESSAGE_CHARS: usize = 255;

/// A packet the server sends.
pub trait OutboundPacket {
    const OPCODE: u8;

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()>;

    /// Frames the packet into `buf`. On failure nothing of the packet is left
    /// behind in the buffer.
    fn send(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        let mut payload = FramedBuffer::with_capacity(32);
        self.write_payload(&mut payload)?;
        buf.write_frame(Self::OPCODE, payload.written())
    }
}

/// A packet the server receives.
pub trait InboundPacket: Sized {
    const OPCODE: u8;

    fn decode(buf: &mut FramedBuffer) -> BufferResult<Self>;

    fn from_payload(payload: &[u8]) -> BufferResult<Self> {
        Self::decode(&mut FramedBuffer::from_bytes(payload))
    }
}

/// Removes a ground item with the given id at a packed position relative to
/// the current placement base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteGroundItem {
    pub packed_position: u8,
    pub item_id: u16,
}

impl OutboundPacket for DeleteGroundItem {
    const OPCODE: u8 = opcodes::DELETE_GROUND_ITEM;

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_u8(self.packed_position)?;
        buf.write_u16(self.item_id)
    }
}

impl DeleteGroundItem {
    pub fn decode(buf: &mut FramedBuffer) -> BufferResult<Self> {
        Ok(Self {
            packed_position: buf.read_u8()?,
            item_id: buf.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnGroundItem {
    pub item_id: u16,
    pub amount: u16,
    pub packed_position: u8,
}

impl OutboundPacket for SpawnGroundItem {
    const OPCODE: u8 = opcodes::SPAWN_GROUND_ITEM;

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_u16(self.item_id)?;
        buf.write_u16(self.amount)?;
        buf.write_u8(self.packed_position)
    }
}

/// Sets the 8x8 region, relative to the client's viewport base, that
/// following packed positions refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementBase {
    pub local_x: u8,
    pub local_y: u8,
}

impl OutboundPacket for PlacementBase {
    const OPCODE: u8 = opcodes::PLACEMENT_BASE;

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_u8(self.local_y)?;
        buf.write_u8(self.local_x)
    }
}

/// Rebases the client's viewport onto a new region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionChange {
    pub region_x: u16,
    pub region_y: u16,
}

impl OutboundPacket for RegionChange {
    const OPCODE: u8 = opcodes::REGION_CHANGE;

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_u16(self.region_x)?;
        buf.write_u16(self.region_y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMessage {
    pub text: String,
}

impl OutboundPacket for SystemMessage {
    const OPCODE: u8 = opcodes::SYSTEM_MESSAGE;

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_string(&self.text)
    }
}

/// Absolute reference tile followed by waypoints relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRequest {
    pub reference_x: u16,
    pub reference_y: u16,
    pub waypoints: Vec<(i8, i8)>,
}

impl InboundPacket for WalkRequest {
    const OPCODE: u8 = opcodes::WALK;

    fn decode(buf: &mut FramedBuffer) -> BufferResult<Self> {
        let reference_x = buf.read_u16()?;
        let reference_y = buf.read_u16()?;
        let count = buf.read_u8()? as usize;
        if count > MAX_WALK_WAYPOINTS {
            return Err(BufferError::Overflow {
                length: count,
                max: MAX_WALK_WAYPOINTS,
            });
        }
        let mut waypoints = Vec::with_capacity(count);
        for _ in 0..count {
            waypoints.push((buf.read_i8()?, buf.read_i8()?));
        }
        Ok(Self {
            reference_x,
            reference_y,
            waypoints,
        })
    }
}

impl WalkRequest {
    pub fn encode(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        let mut payload = FramedBuffer::with_capacity(5 + self.waypoints.len() * 2);
        payload.write_u16(self.reference_x)?;
        payload.write_u16(self.reference_y)?;
        payload.write_u8(self.waypoints.len().min(u8::MAX as usize) as u8)?;
        for (dx, dy) in &self.waypoints {
            payload.write_i8(*dx)?;
            payload.write_i8(*dy)?;
        }
        buf.write_frame(Self::OPCODE, payload.written())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub effects: u8,
    pub color: u8,
    pub text: String,
}

impl InboundPacket for ChatRequest {
    const OPCODE: u8 = opcodes::CHAT;

    fn decode(buf: &mut FramedBuffer) -> BufferResult<Self> {
        Ok(Self {
            effects: buf.read_u8()?,
            color: buf.read_u8()?,
            text: buf.read_length_prefixed_string(MAX_CHAT_CHARS)?,
        })
    }
}

impl ChatRequest {
    pub fn encode(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        let mut payload = FramedBuffer::with_capacity(3 + self.text.len());
        payload.write_u8(self.effects)?;
        payload.write_u8(self.color)?;
        payload.write_string(&self.text)?;
        buf.write_frame(Self::OPCODE, payload.written())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowRequest {
    pub target: u16,
}

impl InboundPacket for FollowRequest {
    const OPCODE: u8 = opcodes::FOLLOW;

    fn decode(buf: &mut FramedBuffer) -> BufferResult<Self> {
        Ok(Self {
            target: buf.read_u16()?,
        })
    }
}

impl FollowRequest {
    pub fn encode(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_frame(Self::OPCODE, &self.target.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{pack_position, unpack_position};

    #[test]
    fn test_delete_ground_item_frame_decodes_to_same_triplet() {
        let mut buf = FramedBuffer::default();
        let packet = DeleteGroundItem {
            packed_position: pack_position(3, 5),
            item_id: 995,
        };
        packet.send(&mut buf).unwrap();

        let frame = buf.read_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 156);
        let decoded = DeleteGroundItem::decode(&mut FramedBuffer::from_bytes(&frame.payload)).unwrap();
        assert_eq!(unpack_position(decoded.packed_position), (3, 5));
        assert_eq!(decoded.item_id, 995);
    }

    #[test]
    fn test_failed_payload_leaves_buffer_untouched() {
        let mut buf = FramedBuffer::default();
        let packet = SystemMessage {
            text: "x".repeat(300),
        };
        assert!(packet.send(&mut buf).is_err());
        assert!(buf.written().is_empty());
        assert!(!buf.is_frame_open());
    }

    #[test]
    fn test_walk_request_rejects_too_many_waypoints() {
        let mut payload = vec![0, 10, 0, 20, (MAX_WALK_WAYPOINTS + 1) as u8];
        payload.extend(std::iter::repeat(1).take((MAX_WALK_WAYPOINTS + 1) * 2));
        assert!(matches!(
            WalkRequest::from_payload(&payload),
            Err(BufferError::Overflow { .. })
        ));
    }

    #[test]
    fn test_walk_request_round_trip_through_frame() {
        let request = WalkRequest {
            reference_x: 3200,
            reference_y: 3200,
            waypoints: vec![(0, 0), (2, -1)],
        };
        let mut buf = FramedBuffer::default();
        request.encode(&mut buf).unwrap();
        let frame = buf.read_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, opcodes::WALK);
        assert_eq!(WalkRequest::from_payload(&frame.payload).unwrap(), request);
    }

    #[test]
    fn test_chat_text_is_bounded() {
        let mut buf = FramedBuffer::default();
        buf.write_u8(0).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_string(&"a".repeat(MAX_CHAT_CHARS + 1)).unwrap();
        assert!(matches!(
            ChatRequest::from_payload(buf.written()),
            Err(BufferError::Overflow { .. })
        ));
    }
}
