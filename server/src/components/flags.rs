use super::FLAGS_PRIORITY;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityMessage};
use crate::update::{FlagAccumulator, FlagKind, UpdateFlag};
use std::any::Any;

/// Turns visible state changes into update flags for this tick.
#[derive(Debug, Default)]
pub struct FlagsComponent {
    flags: FlagAccumulator,
}

impl FlagsComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> &FlagAccumulator {
        &self.flags
    }
}

impl Component for FlagsComponent {
    fn capability(&self) -> Capability {
        Capability::UpdateFlags
    }

    fn priority(&self) -> i32 {
        FLAGS_PRIORITY
    }

    fn receive(&mut self, _ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        let flag = match &message.event {
            EntityEvent::ChatMessage(line) => UpdateFlag::Chat(line.clone()),
            EntityEvent::NewAnimation(animation) => UpdateFlag::Animation(*animation),
            EntityEvent::NewOverheadText(text) => UpdateFlag::OverheadText(text.clone()),
            EntityEvent::ParticleEffect(effect) => UpdateFlag::ParticleEffect(*effect),
            EntityEvent::AppearanceChanged(block) => UpdateFlag::Appearance(block.clone()),
            EntityEvent::NewInteractingEntity(target) => UpdateFlag::InteractingEntity(*target),
            EntityEvent::NewFacingDirection(position) => UpdateFlag::FacingCoordinate(*position),
            EntityEvent::TookDamage(hit) if self.flags.is_raised(FlagKind::PrimaryHit) => {
                UpdateFlag::SecondaryHit(*hit)
            }
            EntityEvent::TookDamage(hit) => UpdateFlag::PrimaryHit(*hit),
            EntityEvent::FrameEnd => {
                self.flags.clear();
                return;
            }
            _ => return,
        };
        self.flags.raise(flag);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
