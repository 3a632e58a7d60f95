//! Composes the packets one client receives at the end of a tick.
//!
//! Per observer, in order: a region change when the viewport moved or the
//! client was (re)initialised, ground item spawns and removals, then one
//! entity update packet covering the observer itself, the entities it
//! already knew about and the ones that just came into view.

use crate::components::{FlagsComponent, GroundItemComponent, VisionComponent};
use crate::entity::{Entity, EntityId};
use crate::transform::{Transform, VIEWPORT_ORIGIN_CHUNKS};
use crate::update::Observer;
use shared::packets::{
    opcodes, DeleteGroundItem, OutboundPacket, PlacementBase, RegionChange, SpawnGroundItem,
};
use shared::protocol::{direction_code, pack_position};
use shared::{BufferResult, FramedBuffer};
use std::collections::{BTreeMap, BTreeSet};

/// Most entities introduced to one client per tick.
pub const MAX_ADDITIONS_PER_TICK: usize = 255;

/// Most mobile entities a client can hold; the count goes out as one byte.
pub const MAX_KNOWN_MOBILES: usize = u8::MAX as usize;

/// Movement block kinds.
pub const MOVEMENT_NONE: u8 = 0;
pub const MOVEMENT_WALK: u8 = 1;
pub const MOVEMENT_RUN: u8 = 2;
pub const MOVEMENT_PLACEMENT: u8 = 3;

/// Status byte for an entity the client already knows.
pub const ENTITY_REMOVED: u8 = 0;
pub const ENTITY_PRESENT: u8 = 1;

/// Output of one observer's sync.
#[derive(Debug, Clone, Default)]
pub struct ClientSync {
    pub packets: Vec<u8>,
    pub known: BTreeSet<EntityId>,
}

pub fn wire_id(id: EntityId) -> u16 {
    id.0 as u16
}

fn offset(from: &Transform, to: &Transform) -> (i8, i8) {
    let (a, b) = (from.position(), to.position());
    (
        (b.x - a.x).clamp(i8::MIN.into(), i8::MAX.into()) as i8,
        (b.y - a.y).clamp(i8::MIN.into(), i8::MAX.into()) as i8,
    )
}

fn write_movement(
    buf: &mut FramedBuffer,
    entity: &Transform,
    observer: &Transform,
    own: bool,
    force_placement: bool,
) -> BufferResult<()> {
    let movement = entity.tick_movement();
    let codes: Option<Vec<u8>> = movement
        .steps
        .iter()
        .map(|(dx, dy)| direction_code(*dx, *dy))
        .collect();

    match codes.as_deref() {
        _ if force_placement || movement.teleported => {}
        Some([]) => return buf.write_u8(MOVEMENT_NONE),
        Some([step]) => {
            buf.write_u8(MOVEMENT_WALK)?;
            return buf.write_u8(*step);
        }
        Some([first, second]) => {
            buf.write_u8(MOVEMENT_RUN)?;
            buf.write_u8(*first)?;
            return buf.write_u8(*second);
        }
        _ => {}
    }

    buf.write_u8(MOVEMENT_PLACEMENT)?;
    buf.write_u8(entity.position().z)?;
    if own {
        let (lx, ly) = entity.local();
        buf.write_u8(lx as u8)?;
        buf.write_u8(ly as u8)
    } else {
        let (dx, dy) = offset(observer, entity);
        buf.write_i8(dx)?;
        buf.write_i8(dy)
    }
}

fn write_flags(buf: &mut FramedBuffer, entity: &Entity, observer: Observer) -> BufferResult<()> {
    match entity.get::<FlagsComponent>() {
        Some(flags) => flags.flags().write(observer, buf),
        None => buf.write_u8(0),
    }
}

fn write_ground_item(
    buf: &mut FramedBuffer,
    observer: &Transform,
    item_entity: &Entity,
    spawn: bool,
) -> BufferResult<()> {
    let Some(item) = item_entity.get::<GroundItemComponent>() else {
        return Ok(());
    };
    let (base_x, base_y) = observer.base();
    let position = item_entity.transform().position();
    let (local_x, local_y) = (position.x - base_x, position.y - base_y);
    PlacementBase {
        local_x: (local_x & !7) as u8,
        local_y: (local_y & !7) as u8,
    }
    .send(buf)?;
    let packed_position = pack_position(local_x, local_y);
    if spawn {
        SpawnGroundItem {
            item_id: item.item_id(),
            amount: item.amount(),
            packed_position,
        }
        .send(buf)
    } else {
        DeleteGroundItem {
            packed_position,
            item_id: item.item_id(),
        }
        .send(buf)
    }
}

fn is_ground_item(entities: &BTreeMap<EntityId, Entity>, id: &EntityId) -> bool {
    entities
        .get(id)
        .map(|entity| entity.get::<GroundItemComponent>().is_some())
        .unwrap_or(false)
}

/// Builds everything `observer_id` should receive this tick.
///
/// `rebase` forces a region change and a full placement, as after login or
/// reconnect. `known` is what the client was told about up to now.
pub fn compose(
    observer_id: EntityId,
    entities: &BTreeMap<EntityId, Entity>,
    rebase: bool,
    known: &BTreeSet<EntityId>,
) -> BufferResult<ClientSync> {
    let Some(observer) = entities.get(&observer_id) else {
        return Ok(ClientSync::default());
    };
    let empty = BTreeSet::new();
    let visible = observer
        .get::<VisionComponent>()
        .map(|vision| vision.visible())
        .unwrap_or(&empty);
    let view = observer.transform();
    let mut out = FramedBuffer::with_capacity(256);
    let mut next_known = BTreeSet::new();

    let region_changed = rebase || view.tick_movement().region_changed;
    if region_changed {
        let (region_x, region_y) = view.region();
        RegionChange {
            region_x: (region_x + VIEWPORT_ORIGIN_CHUNKS) as u16,
            region_y: (region_y + VIEWPORT_ORIGIN_CHUNKS) as u16,
        }
        .send(&mut out)?;
    }

    // a region change wipes the client's ground items
    let known_items: BTreeSet<EntityId> = if region_changed {
        BTreeSet::new()
    } else {
        known
            .iter()
            .filter(|id| is_ground_item(entities, id))
            .copied()
            .collect()
    };
    for id in known_items.difference(visible) {
        if let Some(item) = entities.get(id) {
            write_ground_item(&mut out, view, item, false)?;
        }
    }
    for id in visible.iter().filter(|id| is_ground_item(entities, id)) {
        if !known_items.contains(id) {
            if let Some(item) = entities.get(id) {
                write_ground_item(&mut out, view, item, true)?;
            }
        }
        next_known.insert(*id);
    }

    let mut update = FramedBuffer::with_capacity(256);
    write_movement(&mut update, view, view, true, rebase)?;
    write_flags(&mut update, observer, Observer::Own)?;

    let known_mobiles: Vec<EntityId> = known
        .iter()
        .filter(|id| !is_ground_item(entities, id))
        .copied()
        .collect();
    let (listed, unlisted) = known_mobiles.split_at(known_mobiles.len().min(MAX_KNOWN_MOBILES));
    update.write_u8(listed.len() as u8)?;
    let mut kept = unlisted.len();
    for id in listed {
        update.write_u16(wire_id(*id))?;
        match entities.get(id) {
            Some(entity) if visible.contains(id) => {
                update.write_u8(ENTITY_PRESENT)?;
                write_movement(&mut update, entity.transform(), view, false, false)?;
                write_flags(&mut update, entity, Observer::Other)?;
                next_known.insert(*id);
                kept += 1;
            }
            _ => update.write_u8(ENTITY_REMOVED)?,
        }
    }
    // the client still holds these, they are listed once the count fits
    next_known.extend(unlisted.iter().copied());

    let room = MAX_KNOWN_MOBILES
        .saturating_sub(kept)
        .min(MAX_ADDITIONS_PER_TICK);
    let additions: Vec<&Entity> = visible
        .iter()
        .filter(|id| !known.contains(id) && !is_ground_item(entities, id))
        .filter_map(|id| entities.get(id))
        .take(room)
        .collect();
    update.write_u8(additions.len() as u8)?;
    for entity in additions {
        let (dx, dy) = offset(view, entity.transform());
        update.write_u16(wire_id(entity.id()))?;
        update.write_i8(dx)?;
        update.write_i8(dy)?;
        update.write_u8(entity.transform().position().z)?;
        write_flags(&mut update, entity, Observer::Other)?;
        next_known.insert(entity.id());
    }
    out.write_frame(opcodes::ENTITY_UPDATE, update.written())?;

    Ok(ClientSync {
        packets: out.written().to_vec(),
        known: next_known,
    })
}
