//! Who can see whom, recomputed after movement each tick.

use crate::components::{GroundItemComponent, PlayerComponent, VisionComponent};
use crate::directions::WorldView;
use crate::entity::{Entity, EntityEvent, EntityId};
use crate::transform::Position;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct EntityView {
    position: Position,
    last_moved: (i8, i8),
    alive: bool,
    vision_range: Option<i32>,
    username: Option<String>,
    private_to: Option<String>,
}

/// Frozen copy of the bits of world state that sight and movement read,
/// so entities can be mutated while it is consulted.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    views: BTreeMap<EntityId, EntityView>,
}

impl WorldSnapshot {
    pub fn capture(entities: &BTreeMap<EntityId, Entity>) -> Self {
        let views = entities
            .iter()
            .map(|(id, entity)| {
                let view = EntityView {
                    position: entity.transform().position(),
                    last_moved: entity.transform().last_moved_direction(),
                    alive: !entity.is_dead(),
                    vision_range: entity.get::<VisionComponent>().map(|v| v.range()),
                    username: entity
                        .get::<PlayerComponent>()
                        .map(|p| p.username().to_owned()),
                    private_to: entity
                        .get::<GroundItemComponent>()
                        .and_then(|item| item.private_to())
                        .map(str::to_owned),
                };
                (*id, view)
            })
            .collect();
        Self { views }
    }

    /// Every entity `observer` can see right now.
    pub fn visible_to(&self, observer: EntityId) -> BTreeSet<EntityId> {
        self.views
            .keys()
            .copied()
            .filter(|target| self.can_see(observer, *target))
            .collect()
    }
}

impl WorldView for WorldSnapshot {
    fn position(&self, id: EntityId) -> Option<Position> {
        self.views.get(&id).map(|view| view.position)
    }

    fn last_moved(&self, id: EntityId) -> Option<(i8, i8)> {
        self.views.get(&id).map(|view| view.last_moved)
    }

    fn is_alive(&self, id: EntityId) -> bool {
        self.views.get(&id).map(|view| view.alive).unwrap_or(false)
    }

    fn can_see(&self, observer: EntityId, target: EntityId) -> bool {
        if observer == target {
            return false;
        }
        let (Some(eye), Some(seen)) = (self.views.get(&observer), self.views.get(&target)) else {
            return false;
        };
        let Some(range) = eye.vision_range else {
            return false;
        };
        if !eye.alive || !seen.alive {
            return false;
        }
        if eye.position.z != seen.position.z || eye.position.chebyshev_distance(&seen.position) > range {
            return false;
        }
        match &seen.private_to {
            Some(owner) => eye.username.as_deref() == Some(owner.as_str()),
            None => true,
        }
    }
}

/// Brings every vision component up to date, telling observers who entered
/// or left view and telling newly seen entities who is watching them.
pub fn evaluate_sight(entities: &mut BTreeMap<EntityId, Entity>) {
    let snapshot = WorldSnapshot::capture(entities);
    let mut deliveries = Vec::new();

    for (id, entity) in entities.iter() {
        let Some(vision) = entity.get::<VisionComponent>() else {
            continue;
        };
        let now = snapshot.visible_to(*id);
        for gone in vision.visible().difference(&now) {
            deliveries.push((*id, EntityEvent::EntityLeftViewRange(*gone)));
        }
        for seen in now.difference(vision.visible()) {
            deliveries.push((*id, EntityEvent::EntityEnteredViewRange(*seen)));
            deliveries.push((*seen, EntityEvent::ObservedBy(*id)));
        }
    }

    for (id, event) in deliveries {
        if let Some(entity) = entities.get_mut(&id) {
            entity.send_event(event);
        }
    }
    for entity in entities.values_mut() {
        entity.transform_mut().clear_sight_evaluation();
    }
}
