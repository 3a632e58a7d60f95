//! Movement generators consumed once per tick by the movement phase.
//!
//! A provider never moves anything itself. It looks at where its entity is
//! and hands back at most two unit steps; the world applies them. Cancelling
//! a walk is just dropping the provider.

use crate::entity::EntityId;
use crate::transform::{Position, Transform};
use std::collections::VecDeque;

/// Read-only view of the world a provider may consult.
pub trait WorldView {
    fn position(&self, id: EntityId) -> Option<Position>;

    /// Last non-zero step the entity took, `(0, 0)` if it never moved.
    fn last_moved(&self, id: EntityId) -> Option<(i8, i8)>;

    /// Present and not marked dead.
    fn is_alive(&self, id: EntityId) -> bool;

    fn can_see(&self, observer: EntityId, target: EntityId) -> bool;
}

/// Steps produced for one tick: nothing, a walk step, or two run steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneratedDirections {
    first: Option<(i8, i8)>,
    second: Option<(i8, i8)>,
}

impl GeneratedDirections {
    pub const NOOP: Self = Self {
        first: None,
        second: None,
    };

    pub fn walk(step: (i8, i8)) -> Self {
        Self {
            first: Some(step),
            second: None,
        }
    }

    pub fn run(first: (i8, i8), second: (i8, i8)) -> Self {
        Self {
            first: Some(first),
            second: Some(second),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.first.is_none()
    }

    pub fn steps(&self) -> impl Iterator<Item = (i8, i8)> {
        self.first.into_iter().chain(self.second)
    }

    fn from_steps(mut steps: impl Iterator<Item = (i8, i8)>) -> Self {
        let first = steps.next();
        let second = first.and(steps.next());
        Self { first, second }
    }
}

/// Source of movement steps for one entity.
pub trait DirectionsProvider: Send {
    fn next_directions(
        &mut self,
        entity: EntityId,
        transform: &Transform,
        world: &dyn WorldView,
    ) -> GeneratedDirections;

    fn is_done(&self, entity: EntityId, transform: &Transform, world: &dyn WorldView) -> bool;
}

/// One unit step from `from` toward `to`, diagonal when both axes differ.
pub fn step_toward(from: (i32, i32), to: (i32, i32)) -> (i8, i8) {
    (
        (to.0 - from.0).signum() as i8,
        (to.1 - from.1).signum() as i8,
    )
}

/// Walks through a list of targets in order, ignoring obstacles.
#[derive(Debug, Clone)]
pub struct WaypointDirections {
    targets: VecDeque<(i32, i32)>,
    running: bool,
}

impl WaypointDirections {
    /// Targets are `reference + waypoint` for each waypoint.
    pub fn new(reference: (i32, i32), waypoints: &[(i8, i8)], running: bool) -> Self {
        let targets = waypoints
            .iter()
            .map(|(dx, dy)| (reference.0 + i32::from(*dx), reference.1 + i32::from(*dy)))
            .collect();
        Self { targets, running }
    }

    pub fn remaining_targets(&self) -> usize {
        self.targets.len()
    }

    fn advance(&mut self, position: &mut (i32, i32)) -> Option<(i8, i8)> {
        while self.targets.front() == Some(position) {
            self.targets.pop_front();
        }
        let target = *self.targets.front()?;
        let step = step_toward(*position, target);
        position.0 += i32::from(step.0);
        position.1 += i32::from(step.1);
        if *position == target {
            self.targets.pop_front();
        }
        Some(step)
    }
}

impl DirectionsProvider for WaypointDirections {
    fn next_directions(
        &mut self,
        _entity: EntityId,
        transform: &Transform,
        _world: &dyn WorldView,
    ) -> GeneratedDirections {
        let position = transform.position();
        let mut cursor = (position.x, position.y);
        let Some(first) = self.advance(&mut cursor) else {
            return GeneratedDirections::NOOP;
        };
        let second = if self.running {
            self.advance(&mut cursor)
        } else {
            None
        };
        match second {
            Some(second) => GeneratedDirections::run(first, second),
            None => GeneratedDirections::walk(first),
        }
    }

    fn is_done(&self, _entity: EntityId, transform: &Transform, _world: &dyn WorldView) -> bool {
        let position = transform.position();
        self.targets
            .iter()
            .all(|target| *target == (position.x, position.y))
    }
}

/// Trails another entity, aiming for the tile behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowDirections {
    target: EntityId,
}

impl FollowDirections {
    pub fn new(target: EntityId) -> Self {
        Self { target }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }
}

impl DirectionsProvider for FollowDirections {
    fn next_directions(
        &mut self,
        _entity: EntityId,
        transform: &Transform,
        world: &dyn WorldView,
    ) -> GeneratedDirections {
        let Some(target) = world.position(self.target) else {
            return GeneratedDirections::NOOP;
        };
        let position = transform.position();
        if position.z != target.z {
            return GeneratedDirections::NOOP;
        }

        let facing = world.last_moved(self.target).unwrap_or((0, 0));
        let destination = if facing == (0, 0) {
            // never moved: close in and stop next to it
            if position.chebyshev_distance(&target) <= 1 {
                return GeneratedDirections::NOOP;
            }
            (target.x, target.y)
        } else {
            (target.x - i32::from(facing.0), target.y - i32::from(facing.1))
        };

        let mut cursor = (position.x, position.y);
        let target_tile = (target.x, target.y);
        let steps = std::iter::from_fn(|| {
            if cursor == destination {
                return None;
            }
            let step = step_toward(cursor, destination);
            let next = (cursor.0 + i32::from(step.0), cursor.1 + i32::from(step.1));
            if next == target_tile {
                return None;
            }
            cursor = next;
            Some(step)
        })
        .take(2);
        GeneratedDirections::from_steps(steps)
    }

    fn is_done(&self, entity: EntityId, _transform: &Transform, world: &dyn WorldView) -> bool {
        !world.is_alive(self.target) || !world.can_see(entity, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StaticWorld {
        positions: HashMap<EntityId, (Position, (i8, i8))>,
        dead: Vec<EntityId>,
        blind: bool,
    }

    impl WorldView for StaticWorld {
        fn position(&self, id: EntityId) -> Option<Position> {
            self.positions.get(&id).map(|(pos, _)| *pos)
        }

        fn last_moved(&self, id: EntityId) -> Option<(i8, i8)> {
            self.positions.get(&id).map(|(_, moved)| *moved)
        }

        fn is_alive(&self, id: EntityId) -> bool {
            self.positions.contains_key(&id) && !self.dead.contains(&id)
        }

        fn can_see(&self, _observer: EntityId, target: EntityId) -> bool {
            !self.blind && self.positions.contains_key(&target)
        }
    }

    const ME: EntityId = EntityId(1);
    const TARGET: EntityId = EntityId(2);

    fn walk_all(provider: &mut dyn DirectionsProvider, transform: &mut Transform, world: &StaticWorld) -> Vec<(i8, i8)> {
        let mut steps = Vec::new();
        for _ in 0..100 {
            if provider.is_done(ME, transform, world) {
                break;
            }
            let directions = provider.next_directions(ME, transform, world);
            for (dx, dy) in directions.steps() {
                transform.move_by(dx, dy);
                steps.push((dx, dy));
            }
        }
        steps
    }

    #[test]
    fn test_waypoints_interpolate_diagonally_then_straight() {
        let world = StaticWorld::default();
        let mut transform = Transform::new(Position::new(3200, 3200, 0));
        let mut provider = WaypointDirections::new((3200, 3200), &[(0, 0), (3, 1)], false);

        let steps = walk_all(&mut provider, &mut transform, &world);
        assert_eq!(steps, vec![(1, 1), (1, 0), (1, 0)]);
        assert_eq!(transform.position(), Position::new(3203, 3201, 0));
        assert!(provider.is_done(ME, &transform, &world));
    }

    #[test]
    fn test_running_takes_two_steps_per_tick() {
        let world = StaticWorld::default();
        let transform = Transform::new(Position::new(3200, 3200, 0));
        let mut provider = WaypointDirections::new((3200, 3200), &[(0, 0), (0, -5)], true);
        let directions = provider.next_directions(ME, &transform, &world);
        assert_eq!(directions, GeneratedDirections::run((0, -1), (0, -1)));
    }

    #[test]
    fn test_multiple_waypoints_visit_each_in_order() {
        let world = StaticWorld::default();
        let mut transform = Transform::new(Position::new(100, 100, 0));
        let mut provider = WaypointDirections::new((100, 100), &[(0, 0), (2, 0), (2, 2)], false);
        let steps = walk_all(&mut provider, &mut transform, &world);
        assert_eq!(steps, vec![(1, 0), (1, 0), (0, 1), (0, 1)]);
    }

    #[test]
    fn test_empty_path_is_done_immediately() {
        let world = StaticWorld::default();
        let transform = Transform::new(Position::new(100, 100, 0));
        let provider = WaypointDirections::new((100, 100), &[(0, 0)], false);
        assert!(provider.is_done(ME, &transform, &world));
    }

    #[test]
    fn test_follow_heads_for_tile_behind_target() {
        let mut world = StaticWorld::default();
        world
            .positions
            .insert(TARGET, (Position::new(3210, 3200, 0), (1, 0)));
        let transform = Transform::new(Position::new(3200, 3200, 0));
        let mut provider = FollowDirections::new(TARGET);

        let directions = provider.next_directions(ME, &transform, &world);
        assert_eq!(directions, GeneratedDirections::run((1, 0), (1, 0)));
    }

    #[test]
    fn test_follow_idles_next_to_still_target() {
        let mut world = StaticWorld::default();
        world
            .positions
            .insert(TARGET, (Position::new(3201, 3201, 0), (0, 0)));
        let transform = Transform::new(Position::new(3200, 3200, 0));
        let mut provider = FollowDirections::new(TARGET);
        assert!(provider.next_directions(ME, &transform, &world).is_noop());
    }

    #[test]
    fn test_follow_idles_on_behind_tile() {
        let mut world = StaticWorld::default();
        world
            .positions
            .insert(TARGET, (Position::new(3201, 3200, 0), (1, 0)));
        let transform = Transform::new(Position::new(3200, 3200, 0));
        let mut provider = FollowDirections::new(TARGET);
        assert!(provider.next_directions(ME, &transform, &world).is_noop());
    }

    #[test]
    fn test_follow_never_steps_onto_target() {
        let mut world = StaticWorld::default();
        // target walked toward us, so its behind tile is on the far side
        world
            .positions
            .insert(TARGET, (Position::new(3202, 3200, 0), (-1, 0)));
        let transform = Transform::new(Position::new(3200, 3200, 0));
        let mut provider = FollowDirections::new(TARGET);

        let directions = provider.next_directions(ME, &transform, &world);
        assert_eq!(directions, GeneratedDirections::walk((1, 0)));
    }

    #[test]
    fn test_follow_done_when_target_hidden_or_dead() {
        let mut world = StaticWorld::default();
        world
            .positions
            .insert(TARGET, (Position::new(3205, 3200, 0), (0, 0)));
        let transform = Transform::new(Position::new(3200, 3200, 0));
        let provider = FollowDirections::new(TARGET);
        assert!(!provider.is_done(ME, &transform, &world));

        world.blind = true;
        assert!(provider.is_done(ME, &transform, &world));

        world.blind = false;
        world.dead.push(TARGET);
        assert!(provider.is_done(ME, &transform, &world));

        world.dead.clear();
        world.positions.clear();
        assert!(provider.is_done(ME, &transform, &world));
    }
}
