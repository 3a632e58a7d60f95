//! Per-entity update flags and the block written for each observer.
//!
//! Flags accumulate over a tick and are cleared once at frame end, so every
//! observer written during the tick sees the same set. Payloads are always
//! written in ascending bit order.

use crate::accounts::Appearance;
use crate::entity::EntityId;
use crate::transform::Position;
use shared::{BufferResult, FramedBuffer};

/// Set in the low header byte when a second header byte follows.
pub const EXTENDED_HEADER_BIT: u16 = 0x40;

/// Written for "no interacting entity".
pub const NO_INTERACTION: u16 = 0xFFFF;

/// Marks an appearance block rendered as another definition.
const DEFINITION_MARKER: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    InteractingEntity,
    FacingCoordinate,
    OverheadText,
    Animation,
    Appearance,
    PrimaryHit,
    Chat,
    ParticleEffect,
    SecondaryHit,
}

impl FlagKind {
    /// Every kind, in the order payloads are written.
    pub const ALL: [FlagKind; 9] = [
        FlagKind::InteractingEntity,
        FlagKind::FacingCoordinate,
        FlagKind::OverheadText,
        FlagKind::Animation,
        FlagKind::Appearance,
        FlagKind::PrimaryHit,
        FlagKind::Chat,
        FlagKind::ParticleEffect,
        FlagKind::SecondaryHit,
    ];

    pub fn bit(self) -> u16 {
        match self {
            Self::InteractingEntity => 0x1,
            Self::FacingCoordinate => 0x2,
            Self::OverheadText => 0x4,
            Self::Animation => 0x8,
            Self::Appearance => 0x10,
            Self::PrimaryHit => 0x20,
            Self::Chat => 0x80,
            Self::ParticleEffect => 0x100,
            Self::SecondaryHit => 0x200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub effects: u8,
    pub color: u8,
    pub rights: u8,
    pub text: String,
    /// Raised on the speaker's behalf by the server, so they see it too.
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub id: u16,
    pub delay: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleEffect {
    pub id: u16,
    pub height: u16,
    pub delay: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub damage: u8,
    pub kind: u8,
    pub current: u8,
    pub max: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppearanceBlock {
    pub username: String,
    pub appearance: Appearance,
    pub definition: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateFlag {
    InteractingEntity(Option<EntityId>),
    FacingCoordinate(Position),
    OverheadText(String),
    Animation(Animation),
    Appearance(AppearanceBlock),
    PrimaryHit(Hit),
    Chat(ChatLine),
    ParticleEffect(ParticleEffect),
    SecondaryHit(Hit),
}

impl UpdateFlag {
    pub fn kind(&self) -> FlagKind {
        match self {
            Self::InteractingEntity(_) => FlagKind::InteractingEntity,
            Self::FacingCoordinate(_) => FlagKind::FacingCoordinate,
            Self::OverheadText(_) => FlagKind::OverheadText,
            Self::Animation(_) => FlagKind::Animation,
            Self::Appearance(_) => FlagKind::Appearance,
            Self::PrimaryHit(_) => FlagKind::PrimaryHit,
            Self::Chat(_) => FlagKind::Chat,
            Self::ParticleEffect(_) => FlagKind::ParticleEffect,
            Self::SecondaryHit(_) => FlagKind::SecondaryHit,
        }
    }

    fn write_payload(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        match self {
            Self::InteractingEntity(target) => {
                let id = target
                    .and_then(|id| u16::try_from(id.0).ok())
                    .unwrap_or(NO_INTERACTION);
                buf.write_u16(id)
            }
            Self::FacingCoordinate(position) => {
                buf.write_u16((position.x * 2 + 1) as u16)?;
                buf.write_u16((position.y * 2 + 1) as u16)
            }
            Self::OverheadText(text) => buf.write_string(text),
            Self::Animation(animation) => {
                buf.write_u16(animation.id)?;
                buf.write_u8(animation.delay)
            }
            Self::Appearance(block) => {
                let mut inner = FramedBuffer::with_capacity(64);
                write_appearance(block, &mut inner)?;
                let bytes = inner.written();
                buf.write_u8(bytes.len() as u8)?;
                buf.write_block(bytes)
            }
            Self::PrimaryHit(hit) | Self::SecondaryHit(hit) => {
                buf.write_u8(hit.damage)?;
                buf.write_u8(hit.kind)?;
                buf.write_u8(hit.current)?;
                buf.write_u8(hit.max)
            }
            Self::Chat(line) => {
                buf.write_u8(line.effects)?;
                buf.write_u8(line.color)?;
                buf.write_u8(line.rights)?;
                buf.write_string(&line.text)
            }
            Self::ParticleEffect(effect) => {
                buf.write_u16(effect.id)?;
                buf.write_u16(effect.height)?;
                buf.write_u16(effect.delay)
            }
        }
    }
}

fn write_appearance(block: &AppearanceBlock, buf: &mut FramedBuffer) -> BufferResult<()> {
    buf.write_u8(block.appearance.gender)?;
    buf.write_i8(block.appearance.head_icon)?;
    match block.definition {
        Some(definition) => {
            buf.write_u16(DEFINITION_MARKER)?;
            buf.write_u16(definition)?;
        }
        None => {
            for part in block.appearance.body {
                buf.write_u16(part)?;
            }
        }
    }
    for color in block.appearance.colors {
        buf.write_u8(color)?;
    }
    buf.write_string(&block.username)
}

/// Whose update block is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observer {
    /// The entity's own client.
    Own,
    Other,
}

/// Flags raised on one entity this tick.
#[derive(Debug, Clone, Default)]
pub struct FlagAccumulator {
    bits: u16,
    flags: Vec<UpdateFlag>,
}

impl FlagAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a flag. Raising a kind again replaces the earlier payload.
    pub fn raise(&mut self, flag: UpdateFlag) {
        let bit = flag.kind().bit();
        if self.bits & bit != 0 {
            if let Some(slot) = self.flags.iter_mut().find(|f| f.kind() == flag.kind()) {
                *slot = flag;
            }
            return;
        }
        self.bits |= bit;
        self.flags.push(flag);
    }

    pub fn is_raised(&self, kind: FlagKind) -> bool {
        self.bits & kind.bit() != 0
    }

    pub fn get(&self, kind: FlagKind) -> Option<&UpdateFlag> {
        self.flags.iter().find(|flag| flag.kind() == kind)
    }

    /// Bits visible to `observer`, without the extension bit.
    pub fn header(&self, observer: Observer) -> u16 {
        let mut header = self.bits;
        if observer == Observer::Own {
            let forced = matches!(
                self.get(FlagKind::Chat),
                Some(UpdateFlag::Chat(ChatLine { forced: true, .. }))
            );
            if !forced {
                header &= !FlagKind::Chat.bit();
            }
        }
        header
    }

    pub fn needs_update(&self, observer: Observer) -> bool {
        self.header(observer) != 0
    }

    /// Writes the header followed by each visible payload.
    pub fn write(&self, observer: Observer, buf: &mut FramedBuffer) -> BufferResult<()> {
        let header = self.header(observer);
        write_header(header, buf)?;
        for kind in FlagKind::ALL {
            if header & kind.bit() == 0 {
                continue;
            }
            if let Some(flag) = self.get(kind) {
                flag.write_payload(buf)?;
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.bits = 0;
        self.flags.clear();
    }
}

/// Writes a header as one byte, or as two (low byte first) with the
/// extension bit set when it doesn't fit.
pub fn write_header(header: u16, buf: &mut FramedBuffer) -> BufferResult<()> {
    if header > 0xFF {
        let extended = header | EXTENDED_HEADER_BIT;
        buf.write_u8((extended & 0xFF) as u8)?;
        buf.write_u8((extended >> 8) as u8)
    } else {
        buf.write_u8(header as u8)
    }
}

pub fn read_header(buf: &mut FramedBuffer) -> BufferResult<u16> {
    let low = u16::from(buf.read_u8()?);
    if low & EXTENDED_HEADER_BIT != 0 {
        let high = u16::from(buf.read_u8()?);
        Ok(((high << 8) | low) & !EXTENDED_HEADER_BIT)
    } else {
        Ok(low)
    }
}
