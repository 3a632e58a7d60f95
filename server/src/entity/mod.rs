//! Entities, the components attached to them and the messages that drive them.
//!
//! Components never hold references to each other. Anything one component
//! wants the others to know about is raised as an [`EntityMessage`] through
//! the [`EntityContext`] it is handed, and delivered after the current
//! message has reached every component.

mod component;
mod message;

pub use component::{Capability, Component, ComponentSet};
pub use message::{DamageRequest, EntityEvent, EntityMessage, EventKind};

use crate::transform::{Position, Transform};
use log::warn;
use std::collections::VecDeque;
use std::fmt;

/// Upper bound on messages one `send` may deliver before it gives up.
pub const MAX_MESSAGE_CASCADE: usize = 256;

/// Stable identity of an entity for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a component may touch while handling a message.
pub struct EntityContext<'a> {
    pub id: EntityId,
    pub transform: &'a mut Transform,
    outbox: &'a mut VecDeque<EntityMessage>,
    destroy_requested: &'a mut bool,
}

impl EntityContext<'_> {
    /// Queues a message for this entity's components.
    pub fn emit(&mut self, sender: Capability, event: EntityEvent) {
        self.outbox.push_back(EntityMessage::from(sender, event));
    }

    /// Asks the world to destroy this entity at the next tick boundary.
    pub fn request_destroy(&mut self) {
        *self.destroy_requested = true;
    }
}

pub struct Entity {
    id: EntityId,
    name: String,
    transform: Transform,
    components: ComponentSet,
    inbox: VecDeque<EntityMessage>,
    destroy_requested: bool,
    dead: bool,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("position", &self.transform.position())
            .field("components", &self.components)
            .field("dead", &self.dead)
            .finish()
    }
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, position: Position, components: ComponentSet) -> Self {
        Self {
            id,
            name: name.into(),
            transform: Transform::new(position),
            components,
            inbox: VecDeque::new(),
            destroy_requested: false,
            dead: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.components.has(capability)
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components.get::<T>()
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components.get_mut::<T>()
    }

    /// Dead entities still exist for one tick so observers can see them go.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Returns and clears a pending destroy request.
    pub fn take_destroy_request(&mut self) -> bool {
        std::mem::take(&mut self.destroy_requested)
    }

    /// Delivers a message, then everything the components raise in response,
    /// each to all components in priority order.
    pub fn send(&mut self, message: EntityMessage) {
        let mut queue = VecDeque::from([message]);
        let mut delivered = 0;
        while let Some(message) = queue.pop_front() {
            delivered += 1;
            if delivered > MAX_MESSAGE_CASCADE {
                warn!(
                    "Entity {} dropped {} messages after a runaway cascade, next was {:?}",
                    self.id,
                    queue.len() + 1,
                    message.kind()
                );
                break;
            }
            let mut ctx = EntityContext {
                id: self.id,
                transform: &mut self.transform,
                outbox: &mut queue,
                destroy_requested: &mut self.destroy_requested,
            };
            self.components.dispatch(&mut ctx, &message);
        }
    }

    pub fn send_event(&mut self, event: EntityEvent) {
        self.send(EntityMessage::system(event));
    }

    /// Queues a message for the next [`flush_inbox`](Self::flush_inbox).
    pub fn post(&mut self, message: EntityMessage) {
        self.inbox.push_back(message);
    }

    pub fn flush_inbox(&mut self) {
        while let Some(message) = self.inbox.pop_front() {
            self.send(message);
        }
    }

    /// Steps one tile and tells the components about it.
    pub fn move_by(&mut self, dx: i8, dy: i8) {
        if dx == 0 && dy == 0 {
            return;
        }
        let region_changed = self.transform.move_by(dx, dy);
        self.send_event(EntityEvent::Move { dx, dy });
        if region_changed {
            self.send_event(EntityEvent::ClientRegionChanged(self.transform.region()));
        }
    }

    pub fn teleport(&mut self, to: Position) {
        let from = self.transform.position();
        let region_changed = self.transform.set_absolute(to.x, to.y, to.z);
        self.send_event(EntityEvent::Teleport { from, to });
        if region_changed {
            self.send_event(EntityEvent::ClientRegionChanged(self.transform.region()));
        }
    }

    pub fn switch_plane(&mut self, z: u8) {
        let from = self.transform.position().z;
        if from == z {
            return;
        }
        self.transform.switch_plane(z);
        self.send_event(EntityEvent::PlaneSwitch { from, to: z });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityError;
    use std::any::Any;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(Capability, EventKind)>>>;

    struct Recorder {
        capability: Capability,
        priority: i32,
        requires: &'static [Capability],
        log: Log,
        echo: Option<EventKind>,
    }

    impl Recorder {
        fn new(capability: Capability, priority: i32, log: &Log) -> Self {
            Self {
                capability,
                priority,
                requires: &[],
                log: Arc::clone(log),
                echo: None,
            }
        }
    }

    impl Component for Recorder {
        fn capability(&self) -> Capability {
            self.capability
        }

        fn requires(&self) -> &'static [Capability] {
            self.requires
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
            self.log.lock().unwrap().push((self.capability, message.kind()));
            if self.echo == Some(message.kind()) {
                ctx.emit(self.capability, EntityEvent::ArrivedAtDestination);
            }
            if message.kind() == EventKind::DestroyEntity {
                ctx.request_destroy();
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn origin() -> Position {
        Position::new(3200, 3200, 0)
    }

    #[test]
    fn test_dispatch_follows_priority() {
        let log = Log::default();
        let components = ComponentSet::new()
            .with(Recorder::new(Capability::Network, 30, &log))
            .unwrap()
            .with(Recorder::new(Capability::Player, 10, &log))
            .unwrap()
            .with(Recorder::new(Capability::Health, 20, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        entity.send_event(EntityEvent::FrameUpdate);

        let order: Vec<_> = log.lock().unwrap().iter().map(|(cap, _)| *cap).collect();
        assert_eq!(order, vec![Capability::Player, Capability::Health, Capability::Network]);
    }

    #[test]
    fn test_emitted_messages_follow_current_one() {
        let log = Log::default();
        let mut first = Recorder::new(Capability::Movement, 1, &log);
        first.echo = Some(EventKind::FrameUpdate);
        let components = ComponentSet::new()
            .with(first)
            .unwrap()
            .with(Recorder::new(Capability::Player, 2, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        entity.send_event(EntityEvent::FrameUpdate);

        let seen = log.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (Capability::Movement, EventKind::FrameUpdate),
                (Capability::Player, EventKind::FrameUpdate),
                (Capability::Movement, EventKind::ArrivedAtDestination),
                (Capability::Player, EventKind::ArrivedAtDestination),
            ]
        );
    }

    #[test]
    fn test_runaway_cascade_is_cut_off() {
        let log = Log::default();
        let mut echo = Recorder::new(Capability::Movement, 1, &log);
        echo.echo = Some(EventKind::ArrivedAtDestination);
        let components = ComponentSet::new().with(echo).unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        entity.send_event(EntityEvent::ArrivedAtDestination);
        assert_eq!(log.lock().unwrap().len(), MAX_MESSAGE_CASCADE);
    }

    #[test]
    fn test_missing_requirement_fails_attach() {
        let log = Log::default();
        let mut network = Recorder::new(Capability::Network, 1, &log);
        network.requires = &[Capability::Player];
        let err = ComponentSet::new().with(network).unwrap_err();
        assert_eq!(
            err,
            EntityError::UnsatisfiedComponentRequirement {
                component: Capability::Network,
                missing: Capability::Player,
            }
        );
    }

    #[test]
    fn test_duplicate_capability_fails_attach() {
        let log = Log::default();
        let err = ComponentSet::new()
            .with(Recorder::new(Capability::Health, 1, &log))
            .unwrap()
            .with(Recorder::new(Capability::Health, 2, &log))
            .unwrap_err();
        assert_eq!(err, EntityError::DuplicateComponent(Capability::Health));
    }

    #[test]
    fn test_destroy_request_is_taken_once() {
        let log = Log::default();
        let components = ComponentSet::new()
            .with(Recorder::new(Capability::Player, 1, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(4), "test", origin(), components);
        entity.post(EntityMessage::system(EntityEvent::DestroyEntity));
        assert!(!entity.take_destroy_request());
        entity.flush_inbox();
        assert!(entity.take_destroy_request());
        assert!(!entity.take_destroy_request());
    }

    #[test]
    fn test_move_announces_region_change() {
        let log = Log::default();
        let components = ComponentSet::new()
            .with(Recorder::new(Capability::Player, 1, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        for _ in 0..40 {
            entity.move_by(1, 0);
        }
        let kinds: Vec<_> = log.lock().unwrap().iter().map(|(_, kind)| *kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::Move).count(), 40);
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::ClientRegionChanged).count(),
            1
        );
    }

    #[test]
    fn test_long_teleport_announces_region_change() {
        let log = Log::default();
        let components = ComponentSet::new()
            .with(Recorder::new(Capability::Player, 1, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        entity.teleport(Position::new(3240, 3200, 0));
        entity.teleport(Position::new(3241, 3200, 0));
        let kinds: Vec<_> = log.lock().unwrap().iter().map(|(_, kind)| *kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Teleport, EventKind::ClientRegionChanged, EventKind::Teleport]
        );
        assert_eq!(entity.transform().region(), ((3240 >> 3) - 6, (3200 >> 3) - 6));
    }

    #[test]
    fn test_plane_switch_is_announced_once() {
        let log = Log::default();
        let components = ComponentSet::new()
            .with(Recorder::new(Capability::Player, 1, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        entity.switch_plane(1);
        entity.switch_plane(1);
        assert_eq!(
            log.lock().unwrap().clone(),
            vec![(Capability::Player, EventKind::PlaneSwitch)]
        );
        assert_eq!(entity.transform().position().z, 1);
    }

    #[test]
    fn test_components_are_found_by_type() {
        let log = Log::default();
        let components = ComponentSet::new()
            .with(Recorder::new(Capability::Player, 1, &log))
            .unwrap();
        let mut entity = Entity::new(EntityId(1), "test", origin(), components);
        assert!(entity.get::<Recorder>().is_some());
        entity.get_mut::<Recorder>().unwrap().priority = 9;
        assert!(entity.has(Capability::Player));
        assert!(!entity.has(Capability::Vision));
    }
}
