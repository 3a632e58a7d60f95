//! Absolute world positions and the client-relative viewport derived from them.
//!
//! The viewport is expressed as a region (in 8x8 chunks) plus a local offset
//! from that region's base tile. Clients receive local coordinates, so the
//! region only has to be resent when the local offset leaves the window
//! `[MIN_LOCAL, MAX_LOCAL)`, at which point the window slides by
//! `SHIFT_CHUNKS` chunks.

use serde::{Deserialize, Serialize};

/// Edge length of a region chunk, in tiles.
pub const REGION_SIZE: i32 = 8;
/// Chunks between the viewport's base and the chunk holding the entity
/// right after a full recompute.
pub const VIEWPORT_ORIGIN_CHUNKS: i32 = 6;
/// Lowest local coordinate that does not trigger a shift.
pub const MIN_LOCAL: i32 = 2 * REGION_SIZE;
/// First local coordinate past the window.
pub const MAX_LOCAL: i32 = 11 * REGION_SIZE;
/// Chunks the window moves on a shift.
pub const SHIFT_CHUNKS: i32 = 4;
/// Tiles the window moves on a shift.
pub const SHIFT_TILES: i32 = SHIFT_CHUNKS * REGION_SIZE;

/// An absolute tile position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: u8,
}

impl Position {
    pub fn new(x: i32, y: i32, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z,
        }
    }

    /// Largest of the absolute x and y differences. Planes are ignored.
    pub fn chebyshev_distance(&self, other: &Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Absolute differences per axis.
    pub fn taxicab_distance(&self, other: &Position) -> (i32, i32, i32) {
        (
            (self.x - other.x).abs(),
            (self.y - other.y).abs(),
            (i32::from(self.z) - i32::from(other.z)).abs(),
        )
    }
}

/// Region and local offset an observing client renders around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub region: (i32, i32),
    pub local: (i32, i32),
}

impl Viewport {
    /// Fresh viewport centred on `position`.
    pub fn around(position: Position) -> Self {
        let region = (
            (position.x >> 3) - VIEWPORT_ORIGIN_CHUNKS,
            (position.y >> 3) - VIEWPORT_ORIGIN_CHUNKS,
        );
        let local = (
            position.x - REGION_SIZE * region.0,
            position.y - REGION_SIZE * region.1,
        );
        Self { region, local }
    }

    pub fn base(&self) -> (i32, i32) {
        (self.region.0 * REGION_SIZE, self.region.1 * REGION_SIZE)
    }

    pub fn in_window(&self) -> bool {
        let range = MIN_LOCAL..MAX_LOCAL;
        range.contains(&self.local.0) && range.contains(&self.local.1)
    }
}

fn shift_axis(local: &mut i32, region: &mut i32) -> bool {
    if *local < MIN_LOCAL {
        *local += SHIFT_TILES;
        *region -= SHIFT_CHUNKS;
        true
    } else if *local >= MAX_LOCAL {
        *local -= SHIFT_TILES;
        *region += SHIFT_CHUNKS;
        true
    } else {
        false
    }
}

/// What happened to a transform during the current tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickMovement {
    pub steps: Vec<(i8, i8)>,
    pub teleported: bool,
    pub region_changed: bool,
}

/// An entity's position, facing and viewport.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Position,
    viewport: Viewport,
    last_moved: (i8, i8),
    movement: TickMovement,
    needs_sight_evaluation: bool,
}

impl Transform {
    pub fn new(position: Position) -> Self {
        let mut transform = Self {
            position,
            viewport: Viewport::around(position),
            last_moved: (0, 0),
            movement: TickMovement::default(),
            needs_sight_evaluation: true,
        };
        transform.movement.teleported = true;
        transform.movement.region_changed = true;
        transform
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn region(&self) -> (i32, i32) {
        self.viewport.region
    }

    pub fn local(&self) -> (i32, i32) {
        self.viewport.local
    }

    pub fn base(&self) -> (i32, i32) {
        self.viewport.base()
    }

    /// Last non-zero step taken, used as the facing direction.
    pub fn last_moved_direction(&self) -> (i8, i8) {
        self.last_moved
    }

    pub fn tick_movement(&self) -> &TickMovement {
        &self.movement
    }

    pub fn needs_sight_evaluation(&self) -> bool {
        self.needs_sight_evaluation
    }

    pub fn clear_sight_evaluation(&mut self) {
        self.needs_sight_evaluation = false;
    }

    /// Forces observers to re-check this entity without it moving.
    pub fn request_sight_evaluation(&mut self) {
        self.needs_sight_evaluation = true;
    }

    /// Teleports to an absolute position, recomputing the viewport from scratch.
    ///
    /// Returns whether the client region changed.
    pub fn set_absolute(&mut self, x: i32, y: i32, z: u8) -> bool {
        let previous = self.viewport.region;
        self.position = Position::new(x, y, z);
        self.viewport = Viewport::around(self.position);
        self.movement.teleported = true;
        self.needs_sight_evaluation = true;

        let region_changed = previous != self.viewport.region;
        self.movement.region_changed |= region_changed;
        region_changed
    }

    /// Moves by a delta, sliding the viewport window when the local offset
    /// leaves it. Returns whether the client region changed.
    pub fn move_by(&mut self, dx: i8, dy: i8) -> bool {
        if dx == 0 && dy == 0 {
            return false;
        }
        self.position.x += i32::from(dx);
        self.position.y += i32::from(dy);
        self.viewport.local.0 += i32::from(dx);
        self.viewport.local.1 += i32::from(dy);

        let Viewport { region, local } = &mut self.viewport;
        let shifted_x = shift_axis(&mut local.0, &mut region.0);
        let shifted_y = shift_axis(&mut local.1, &mut region.1);
        let mut region_changed = shifted_x || shifted_y;

        // a single shift can't absorb deltas wider than the window margin
        if !self.viewport.in_window() {
            self.viewport = Viewport::around(self.position);
            region_changed = true;
        }
        debug_assert_eq!(
            (self.position.x, self.position.y),
            (
                self.base().0 + self.local().0,
                self.base().1 + self.local().1
            )
        );

        self.last_moved = (dx, dy);
        self.movement.steps.push((dx, dy));
        self.movement.region_changed |= region_changed;
        self.needs_sight_evaluation = true;
        region_changed
    }

    /// Moves to another plane without touching x/y or the viewport.
    pub fn switch_plane(&mut self, z: u8) {
        if self.position.z == z {
            return;
        }
        self.position.z = z;
        // only a placement block carries the plane
        self.movement.teleported = true;
        self.needs_sight_evaluation = true;
    }

    /// Forgets this tick's movement record. Facing is kept.
    pub fn end_frame(&mut self) {
        self.movement = TickMovement::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_consistent(t: &Transform) {
        let (bx, by) = t.base();
        let (lx, ly) = t.local();
        assert_eq!(t.position().x, bx + lx);
        assert_eq!(t.position().y, by + ly);
        assert!((MIN_LOCAL..MAX_LOCAL).contains(&lx), "local x {lx} out of window");
        assert!((MIN_LOCAL..MAX_LOCAL).contains(&ly), "local y {ly} out of window");
    }

    #[test]
    fn test_window_constants_keep_their_relationship() {
        assert_eq!(MIN_LOCAL, 16);
        assert_eq!(MAX_LOCAL, 88);
        assert_eq!(SHIFT_TILES, 32);
    }

    #[test]
    fn test_teleport_recomputes_region_from_global() {
        let mut t = Transform::new(Position::new(3222, 3218, 0));
        assert_eq!(t.region(), ((3222 >> 3) - 6, (3218 >> 3) - 6));
        assert_consistent(&t);

        t.set_absolute(2000, 4000, 1);
        assert_eq!(t.region(), ((2000 >> 3) - 6, (4000 >> 3) - 6));
        assert_eq!(t.position().z, 1);
        assert_consistent(&t);
    }

    #[test]
    fn test_zero_move_after_teleport_is_noop() {
        let mut t = Transform::new(Position::new(3200, 3200, 0));
        let before = t.viewport();
        t.end_frame();
        assert!(!t.move_by(0, 0));
        assert_eq!(t.viewport(), before);
        assert!(t.tick_movement().steps.is_empty());
    }

    #[test]
    fn test_crossing_upper_border_shifts_back_by_four_chunks() {
        let mut t = Transform::new(Position::new(3200, 3200, 0));
        let start_region = t.region();
        let mut shifts = 0;
        while t.local().0 < MAX_LOCAL - 1 {
            assert!(!t.move_by(1, 0));
        }
        if t.move_by(1, 0) {
            shifts += 1;
        }
        assert_eq!(shifts, 1);
        assert_eq!(t.region().0, start_region.0 + SHIFT_CHUNKS);
        assert_eq!(t.local().0, MAX_LOCAL - SHIFT_TILES);
        assert_consistent(&t);
    }

    #[test]
    fn test_crossing_lower_border_shifts_forward() {
        let mut t = Transform::new(Position::new(3200, 3200, 0));
        let start_region = t.region();
        while !t.move_by(0, -1) {}
        assert_eq!(t.region().1, start_region.1 - SHIFT_CHUNKS);
        assert_eq!(t.local().1, MIN_LOCAL - 1 + SHIFT_TILES);
        assert_consistent(&t);
    }

    #[test]
    fn test_steady_walk_shifts_once_every_32_tiles() {
        let mut t = Transform::new(Position::new(3200, 3200, 0));
        let mut shift_steps = Vec::new();
        for step in 0..300 {
            if t.move_by(1, 1) {
                shift_steps.push(step);
            }
            assert_consistent(&t);
        }
        assert!(shift_steps.len() >= 2);
        for pair in shift_steps.windows(2) {
            assert_eq!(pair[1] - pair[0], SHIFT_TILES);
        }
    }

    #[test]
    fn test_plane_switch_keeps_viewport() {
        let mut t = Transform::new(Position::new(3200, 3200, 0));
        let before = t.viewport();
        t.clear_sight_evaluation();
        t.end_frame();
        t.switch_plane(2);
        assert_eq!(t.viewport(), before);
        assert_eq!(t.position().z, 2);
        assert!(t.needs_sight_evaluation());
        assert!(t.tick_movement().teleported);
        assert!(!t.tick_movement().region_changed);
    }

    #[test]
    fn test_facing_survives_frame_end() {
        let mut t = Transform::new(Position::new(3200, 3200, 0));
        t.move_by(0, -1);
        t.end_frame();
        assert_eq!(t.last_moved_direction(), (0, -1));
        assert!(t.tick_movement().steps.is_empty());
    }

    #[test]
    fn test_distances() {
        let a = Position::new(10, 10, 0);
        let b = Position::new(13, 5, 1);
        assert_eq!(a.chebyshev_distance(&b), 5);
        assert_eq!(a.taxicab_distance(&b), (3, 5, 1));
    }

    proptest! {
        #[test]
        fn test_moves_preserve_viewport_invariant(
            start_x in 64i32..10_000,
            start_y in 64i32..10_000,
            moves in proptest::collection::vec((-1i8..=1, -1i8..=1), 0..400),
        ) {
            let mut t = Transform::new(Position::new(start_x, start_y, 0));
            for (dx, dy) in moves {
                t.move_by(dx, dy);
                let (bx, by) = t.base();
                let (lx, ly) = t.local();
                prop_assert_eq!(t.position().x, bx + lx);
                prop_assert_eq!(t.position().y, by + ly);
                prop_assert!((MIN_LOCAL..MAX_LOCAL).contains(&lx));
                prop_assert!((MIN_LOCAL..MAX_LOCAL).contains(&ly));
            }
        }

        #[test]
        fn test_region_shifts_come_in_units_of_four(
            moves in proptest::collection::vec((-1i8..=1, -1i8..=1), 1..200),
        ) {
            let mut t = Transform::new(Position::new(3200, 3200, 0));
            for (dx, dy) in moves {
                let before = t.region();
                t.move_by(dx, dy);
                let after = t.region();
                prop_assert!((after.0 - before.0) % SHIFT_CHUNKS == 0);
                prop_assert!((after.1 - before.1) % SHIFT_CHUNKS == 0);
                prop_assert!((after.0 - before.0).abs() <= SHIFT_CHUNKS);
            }
        }
    }
}
