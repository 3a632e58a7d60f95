use super::VISION_PRIORITY;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityId, EntityMessage};
use crate::transform::Position;
use std::any::Any;
use std::collections::BTreeSet;

/// What an entity can currently see. The set is maintained by the world's
/// sight evaluation through enter/leave messages.
#[derive(Debug)]
pub struct VisionComponent {
    range: i32,
    visible: BTreeSet<EntityId>,
}

impl VisionComponent {
    pub fn new(range: i32) -> Self {
        Self {
            range,
            visible: BTreeSet::new(),
        }
    }

    pub fn range(&self) -> i32 {
        self.range
    }

    pub fn visible(&self) -> &BTreeSet<EntityId> {
        &self.visible
    }

    pub fn sees(&self, id: EntityId) -> bool {
        self.visible.contains(&id)
    }

    /// Whether a tile is close enough to be seen from `from`.
    pub fn in_range(&self, from: Position, to: Position) -> bool {
        from.z == to.z && from.chebyshev_distance(&to) <= self.range
    }
}

impl Component for VisionComponent {
    fn capability(&self) -> Capability {
        Capability::Vision
    }

    fn priority(&self) -> i32 {
        VISION_PRIORITY
    }

    fn receive(&mut self, _ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        match &message.event {
            EntityEvent::EntityEnteredViewRange(id) => {
                self.visible.insert(*id);
            }
            EntityEvent::EntityLeftViewRange(id) => {
                self.visible.remove(id);
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
