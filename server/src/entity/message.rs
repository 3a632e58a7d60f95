use super::{Capability, EntityId};
use crate::transform::Position;
use crate::update::{Animation, AppearanceBlock, ChatLine, Hit, ParticleEffect};
use shared::Frame;

/// A message delivered to every component of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMessage {
    /// Component that raised the message, `None` for the world itself.
    pub sender: Option<Capability>,
    pub event: EntityEvent,
}

impl EntityMessage {
    pub fn system(event: EntityEvent) -> Self {
        Self {
            sender: None,
            event,
        }
    }

    pub fn from(sender: Capability, event: EntityEvent) -> Self {
        Self {
            sender: Some(sender),
            event,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Requested damage before the health component applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRequest {
    pub amount: u8,
    pub kind: u8,
}

/// Every event an entity can receive, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    DestroyEntity,
    FrameUpdate,
    NetworkUpdate,
    FrameEnd,
    /// Periodic request to snapshot persistent state.
    DatabaseUpdate,
    NewSystemMessage(String),

    Damage(DamageRequest),
    TookDamage(Hit),
    Heal(u8),
    HealedHealth(u8),
    JustDied,

    NewInteractingEntity(Option<EntityId>),
    NewFacingDirection(Position),
    Move { dx: i8, dy: i8 },
    Teleport { from: Position, to: Position },
    PlaneSwitch { from: u8, to: u8 },
    ClientRegionChanged((i32, i32)),
    BeginMovePath,
    StopMovingAlongMovePath,
    ArrivedAtDestination,
    NewPlayerFollowTarget(EntityId),

    NewPacket(Frame),
    NetworkReinitialize,

    ChatMessage(ChatLine),
    NewAnimation(Animation),
    NewOverheadText(String),
    ParticleEffect(ParticleEffect),
    AppearanceChanged(AppearanceBlock),
    /// Renders the entity as another definition, `None` to revert.
    DefinitionChange(Option<u16>),

    EntityEnteredViewRange(EntityId),
    EntityLeftViewRange(EntityId),
    ObservedBy(EntityId),
}

/// Payload-free tag of an [`EntityEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DestroyEntity,
    FrameUpdate,
    NetworkUpdate,
    FrameEnd,
    DatabaseUpdate,
    NewSystemMessage,
    Damage,
    TookDamage,
    Heal,
    HealedHealth,
    JustDied,
    NewInteractingEntity,
    NewFacingDirection,
    Move,
    Teleport,
    PlaneSwitch,
    ClientRegionChanged,
    BeginMovePath,
    StopMovingAlongMovePath,
    ArrivedAtDestination,
    NewPlayerFollowTarget,
    NewPacket,
    NetworkReinitialize,
    ChatMessage,
    NewAnimation,
    NewOverheadText,
    ParticleEffect,
    AppearanceChanged,
    DefinitionChange,
    EntityEnteredViewRange,
    EntityLeftViewRange,
    ObservedBy,
}

impl EntityEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DestroyEntity => EventKind::DestroyEntity,
            Self::FrameUpdate => EventKind::FrameUpdate,
            Self::NetworkUpdate => EventKind::NetworkUpdate,
            Self::FrameEnd => EventKind::FrameEnd,
            Self::DatabaseUpdate => EventKind::DatabaseUpdate,
            Self::NewSystemMessage(_) => EventKind::NewSystemMessage,
            Self::Damage(_) => EventKind::Damage,
            Self::TookDamage(_) => EventKind::TookDamage,
            Self::Heal(_) => EventKind::Heal,
            Self::HealedHealth(_) => EventKind::HealedHealth,
            Self::JustDied => EventKind::JustDied,
            Self::NewInteractingEntity(_) => EventKind::NewInteractingEntity,
            Self::NewFacingDirection(_) => EventKind::NewFacingDirection,
            Self::Move { .. } => EventKind::Move,
            Self::Teleport { .. } => EventKind::Teleport,
            Self::PlaneSwitch { .. } => EventKind::PlaneSwitch,
            Self::ClientRegionChanged(_) => EventKind::ClientRegionChanged,
            Self::BeginMovePath => EventKind::BeginMovePath,
            Self::StopMovingAlongMovePath => EventKind::StopMovingAlongMovePath,
            Self::ArrivedAtDestination => EventKind::ArrivedAtDestination,
            Self::NewPlayerFollowTarget(_) => EventKind::NewPlayerFollowTarget,
            Self::NewPacket(_) => EventKind::NewPacket,
            Self::NetworkReinitialize => EventKind::NetworkReinitialize,
            Self::ChatMessage(_) => EventKind::ChatMessage,
            Self::NewAnimation(_) => EventKind::NewAnimation,
            Self::NewOverheadText(_) => EventKind::NewOverheadText,
            Self::ParticleEffect(_) => EventKind::ParticleEffect,
            Self::AppearanceChanged(_) => EventKind::AppearanceChanged,
            Self::DefinitionChange(_) => EventKind::DefinitionChange,
            Self::EntityEnteredViewRange(_) => EventKind::EntityEnteredViewRange,
            Self::EntityLeftViewRange(_) => EventKind::EntityLeftViewRange,
            Self::ObservedBy(_) => EventKind::ObservedBy,
        }
    }
}
