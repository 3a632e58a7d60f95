use super::GROUND_ITEM_PRIORITY;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityMessage};
use std::any::Any;

/// An item stack lying on a tile. Items dropped by a player are only shown
/// to that player until they turn public.
#[derive(Debug)]
pub struct GroundItemComponent {
    item_id: u16,
    amount: u16,
    dropped_by: Option<String>,
    age: u32,
    public_after: u32,
    despawn_after: u32,
}

impl GroundItemComponent {
    pub fn new(
        item_id: u16,
        amount: u16,
        dropped_by: Option<String>,
        public_after: u32,
        despawn_after: u32,
    ) -> Self {
        Self {
            item_id,
            amount,
            dropped_by,
            age: 0,
            public_after,
            despawn_after,
        }
    }

    pub fn item_id(&self) -> u16 {
        self.item_id
    }

    pub fn amount(&self) -> u16 {
        self.amount
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn is_public(&self) -> bool {
        self.dropped_by.is_none() || self.age >= self.public_after
    }

    /// The only player who may see the item, while it is private.
    pub fn private_to(&self) -> Option<&str> {
        if self.is_public() {
            None
        } else {
            self.dropped_by.as_deref()
        }
    }

    pub fn visible_to(&self, username: Option<&str>) -> bool {
        match self.private_to() {
            None => true,
            Some(owner) => username == Some(owner),
        }
    }
}

impl Component for GroundItemComponent {
    fn capability(&self) -> Capability {
        Capability::GroundItem
    }

    fn priority(&self) -> i32 {
        GROUND_ITEM_PRIORITY
    }

    fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        if let EntityEvent::FrameUpdate = message.event {
            self.age = self.age.saturating_add(1);
            if self.dropped_by.is_some() && self.age == self.public_after {
                ctx.transform.request_sight_evaluation();
            }
            if self.age >= self.despawn_after {
                ctx.request_destroy();
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_item_turns_public() {
        let mut item = GroundItemComponent::new(995, 10, Some("alice".to_owned()), 2, 10);
        assert!(item.visible_to(Some("alice")));
        assert!(!item.visible_to(Some("bob")));
        assert!(!item.visible_to(None));
        item.age = 2;
        assert!(item.visible_to(Some("bob")));
        assert_eq!(item.private_to(), None);
    }

    #[test]
    fn test_world_item_is_public() {
        let item = GroundItemComponent::new(1, 1, None, 100, 200);
        assert!(item.is_public());
        assert!(item.visible_to(None));
    }
}
