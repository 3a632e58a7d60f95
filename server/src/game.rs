//! The simulated world and its tick.
//!
//! Each tick runs the same phases in order:
//!
//! 1. inbound packets are drained and delivered as `NewPacket` messages
//! 2. `FrameUpdate` reaches every entity
//! 3. directions providers step their entities
//! 4. sight is re-evaluated if anything moved, spawned or died
//! 5. every connected client gets its update packets (`NetworkUpdate`)
//! 6. `FrameEnd` clears flags and per-tick movement
//! 7. at the boundary, entities dead for a full tick are removed and newly
//!    destroyed ones are marked dead
//!
//! Nothing in here blocks. Player saves are collected and handed out through
//! [`World::take_pending_saves`].

use crate::accounts::PlayerProfile;
use crate::components::{
    ConnectionLink, MovementComponent, NetworkComponent, PlayerComponent,
};
use crate::config::ServerConfig;
use crate::directory::PlayerDirectory;
use crate::entity::{Entity, EntityEvent, EntityId, EntityMessage};
use crate::error::EntityError;
use crate::factory;
use crate::gate::{LoginOutcome, LoginTicket};
use crate::sight::{evaluate_sight, WorldSnapshot};
use crate::sync;
use crate::transform::Position;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Highest id handed out; ids go over the wire as `u16`.
pub const MAX_ENTITY_ID: u32 = u16::MAX as u32 - 1;

/// What one tick did, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    pub tick: u64,
    pub entities: usize,
    pub clients: usize,
    pub bytes_sent: usize,
}

pub struct World {
    config: Arc<ServerConfig>,
    directory: PlayerDirectory,
    entities: BTreeMap<EntityId, Entity>,
    next_id: u32,
    tick: u64,
    destroy_queue: BTreeSet<EntityId>,
    dying: Vec<EntityId>,
    pending_saves: Vec<PlayerProfile>,
    sight_dirty: bool,
}

impl World {
    pub fn new(config: Arc<ServerConfig>, directory: PlayerDirectory) -> Self {
        Self {
            config,
            directory,
            entities: BTreeMap::new(),
            next_id: 1,
            tick: 0,
            destroy_queue: BTreeSet::new(),
            dying: Vec::new(),
            pending_saves: Vec::new(),
            sight_dirty: false,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Queues a message for delivery at the start of the next `FrameUpdate`.
    pub fn post(&mut self, id: EntityId, message: EntityMessage) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) if !entity.is_dead() => {
                entity.post(message);
                true
            }
            _ => false,
        }
    }

    /// Requests removal at the next tick boundary.
    pub fn destroy(&mut self, id: EntityId) {
        if self.entities.contains_key(&id) {
            self.destroy_queue.insert(id);
        }
    }

    /// Profiles that should be written to the account store.
    pub fn take_pending_saves(&mut self) -> Vec<PlayerProfile> {
        std::mem::take(&mut self.pending_saves)
    }

    /// Every player's current profile, for a final save on shutdown.
    pub fn snapshot_players(&self) -> Vec<PlayerProfile> {
        self.entities
            .values()
            .filter(|entity| !entity.is_dead())
            .filter_map(factory::profile_of)
            .collect()
    }

    fn allocate_id(&mut self) -> Result<EntityId, EntityError> {
        for _ in 0..MAX_ENTITY_ID {
            let id = EntityId(self.next_id);
            self.next_id = if self.next_id >= MAX_ENTITY_ID {
                1
            } else {
                self.next_id + 1
            };
            if !self.entities.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(EntityError::NoFreeIds)
    }

    fn insert(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        self.entities.insert(id, entity);
        self.sight_dirty = true;
        id
    }

    /// Puts an item stack on the ground.
    pub fn spawn_ground_item(
        &mut self,
        item_id: u16,
        amount: u16,
        position: Position,
        dropped_by: Option<String>,
    ) -> Result<EntityId, EntityError> {
        let id = self.allocate_id()?;
        let entity = factory::ground_item(id, item_id, amount, position, dropped_by, &self.config)?;
        debug!("Spawned item {} x{} at {:?} as {}", item_id, amount, position, id);
        Ok(self.insert(entity))
    }

    /// Turns an accepted login into a player, or rebinds an existing one.
    pub fn accept_login(&mut self, ticket: LoginTicket, link: ConnectionLink) -> Result<EntityId, EntityError> {
        match ticket.outcome {
            LoginOutcome::New(profile) => {
                let spawned = self.allocate_id().and_then(|id| {
                    factory::player(id, &profile, ticket.signlink, ticket.keys, link, &self.config)
                });
                let entity = match spawned {
                    Ok(entity) => entity,
                    Err(err) => {
                        self.directory.remove(&ticket.username);
                        return Err(err);
                    }
                };
                let id = self.insert(entity);
                self.directory.bind(&ticket.username, id, Some(ticket.signlink));
                if let Some(entity) = self.entities.get_mut(&id) {
                    entity.send_event(EntityEvent::NetworkReinitialize);
                    entity.send_event(EntityEvent::NewSystemMessage(self.config.greeting.clone()));
                }
                info!(
                    "{} logged in as entity {} at {:?}",
                    ticket.username, id, profile.position
                );
                Ok(id)
            }
            LoginOutcome::Reconnect(id) => {
                let entity = self
                    .entities
                    .get_mut(&id)
                    .filter(|entity| !entity.is_dead())
                    .ok_or(EntityError::Gone(id))?;
                let network = entity
                    .get_mut::<NetworkComponent>()
                    .ok_or(EntityError::Gone(id))?;
                network.rebind(link, ticket.keys);
                entity.send_event(EntityEvent::NetworkReinitialize);
                self.directory.bind(&ticket.username, id, Some(ticket.signlink));
                self.sight_dirty = true;
                info!("{} reconnected to entity {}", ticket.username, id);
                Ok(id)
            }
        }
    }

    /// Advances the world by one tick.
    pub fn tick(&mut self) -> TickSummary {
        self.tick += 1;

        self.poll_network();
        for entity in self.entities.values_mut().filter(|e| !e.is_dead()) {
            entity.flush_inbox();
            entity.send_event(EntityEvent::FrameUpdate);
        }
        self.collect_destroy_requests();

        self.process_movement();

        let moved = self
            .entities
            .values()
            .any(|entity| entity.transform().needs_sight_evaluation());
        if self.sight_dirty || moved {
            evaluate_sight(&mut self.entities);
            self.sight_dirty = false;
        }

        let (clients, bytes_sent) = self.synchronize();

        if self.config.save_interval_ticks > 0 && self.tick % self.config.save_interval_ticks == 0 {
            for entity in self.entities.values_mut().filter(|e| !e.is_dead()) {
                entity.send_event(EntityEvent::DatabaseUpdate);
            }
        }
        self.collect_saves();

        for entity in self.entities.values_mut() {
            entity.send_event(EntityEvent::FrameEnd);
            entity.transform_mut().end_frame();
        }
        self.collect_destroy_requests();
        self.apply_destroys();

        TickSummary {
            tick: self.tick,
            entities: self.entities.len(),
            clients,
            bytes_sent,
        }
    }

    fn poll_network(&mut self) {
        let grace = self.config.reconnect_grace_ticks;
        for (id, entity) in self.entities.iter_mut() {
            if entity.is_dead() {
                continue;
            }
            let Some(network) = entity.get_mut::<NetworkComponent>() else {
                continue;
            };
            let was_connected = network.is_connected();
            let frames = network.poll_inbound();
            if was_connected && !network.is_connected() {
                info!(
                    "Entity {} lost its connection, holding it for {} ticks",
                    id, grace
                );
            }
            let expired = !network.is_connected() && network.disconnected_ticks() >= grace;
            for frame in frames {
                entity.post(EntityMessage::system(EntityEvent::NewPacket(frame)));
            }
            if expired {
                info!("Entity {} was not reconnected in time", id);
                self.destroy_queue.insert(*id);
            }
        }
    }

    fn process_movement(&mut self) {
        let snapshot = WorldSnapshot::capture(&self.entities);
        for (id, entity) in self.entities.iter_mut() {
            if entity.is_dead() {
                continue;
            }
            let Some(mut provider) = entity
                .get_mut::<MovementComponent>()
                .and_then(MovementComponent::take_provider)
            else {
                continue;
            };

            if provider.is_done(*id, entity.transform(), &snapshot) {
                entity.send_event(EntityEvent::ArrivedAtDestination);
                continue;
            }
            let directions = provider.next_directions(*id, entity.transform(), &snapshot);
            for (dx, dy) in directions.steps() {
                entity.move_by(dx, dy);
            }
            if let Some(movement) = entity.get_mut::<MovementComponent>() {
                movement.restore_provider(provider);
            }
        }
    }

    fn synchronize(&mut self) -> (usize, usize) {
        let observers: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, entity)| {
                !entity.is_dead()
                    && entity
                        .get::<NetworkComponent>()
                        .map_or(false, NetworkComponent::is_connected)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &observers {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.send_event(EntityEvent::NetworkUpdate);
            }
        }

        let mut bytes_sent = 0;
        for id in &observers {
            let Some((rebase, known)) = self
                .entities
                .get_mut(id)
                .and_then(|entity| entity.get_mut::<NetworkComponent>())
                .map(|network| (network.take_rebase(), network.known().clone()))
            else {
                continue;
            };
            let update = match sync::compose(*id, &self.entities, rebase, &known) {
                Ok(update) => update,
                Err(err) => {
                    warn!("Failed to compose update for entity {}: {}", id, err);
                    continue;
                }
            };
            let Some(network) = self
                .entities
                .get_mut(id)
                .and_then(|entity| entity.get_mut::<NetworkComponent>())
            else {
                continue;
            };
            if let Err(err) = network.outbound_mut().write_block(&update.packets) {
                warn!("Outbound buffer for entity {} rejected its update: {}", id, err);
            }
            network.set_known(update.known);
            bytes_sent += network.flush();
        }
        (observers.len(), bytes_sent)
    }

    fn collect_saves(&mut self) {
        for entity in self.entities.values_mut() {
            let requested = entity
                .get_mut::<PlayerComponent>()
                .map_or(false, PlayerComponent::take_save_request);
            if requested {
                if let Some(profile) = factory::profile_of(entity) {
                    self.pending_saves.push(profile);
                }
            }
        }
    }

    fn collect_destroy_requests(&mut self) {
        for (id, entity) in self.entities.iter_mut() {
            if entity.take_destroy_request() {
                self.destroy_queue.insert(*id);
            }
        }
    }

    fn apply_destroys(&mut self) {
        for id in self.dying.drain(..) {
            if let Some(entity) = self.entities.remove(&id) {
                debug!("Removed entity {} ({})", id, entity.name());
            }
        }

        for id in std::mem::take(&mut self.destroy_queue) {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            if entity.is_dead() {
                continue;
            }
            entity.send_event(EntityEvent::DestroyEntity);
            entity.mark_dead();
            if let Some(profile) = factory::profile_of(entity) {
                self.directory.remove_entity(&profile.username, id);
                info!("{} logged out", profile.username);
                self.pending_saves.push(profile);
            }
            self.dying.push(id);
            self.sight_dirty = true;
        }
    }
}
