//! Component sets for the kinds of entity the world creates.

use crate::accounts::PlayerProfile;
use crate::components::{
    AppearanceComponent, ConnectionLink, FlagsComponent, GroundItemComponent, HealthComponent,
    MovementComponent, NetworkComponent, PlayerComponent, SessionKeys, VisionComponent,
};
use crate::config::ServerConfig;
use crate::entity::{ComponentSet, Entity, EntityId};
use crate::error::EntityError;
use crate::transform::Position;

/// A player bound to a freshly authenticated connection.
pub fn player(
    id: EntityId,
    profile: &PlayerProfile,
    signlink: i32,
    keys: SessionKeys,
    link: ConnectionLink,
    config: &ServerConfig,
) -> Result<Entity, EntityError> {
    let components = ComponentSet::new()
        .with(PlayerComponent::new(&profile.username, profile.rights))?
        .with(AppearanceComponent::new(
            &profile.username,
            profile.appearance.clone(),
        ))?
        .with(HealthComponent::new(profile.hitpoints, profile.hitpoints.max(1)))?
        .with(MovementComponent::new())?
        .with(VisionComponent::new(config.view_range))?
        .with(FlagsComponent::new())?
        .with(NetworkComponent::new(signlink, keys, link))?;
    Ok(Entity::new(id, &profile.username, profile.position, components))
}

pub fn ground_item(
    id: EntityId,
    item_id: u16,
    amount: u16,
    position: Position,
    dropped_by: Option<String>,
    config: &ServerConfig,
) -> Result<Entity, EntityError> {
    let components = ComponentSet::new().with(GroundItemComponent::new(
        item_id,
        amount,
        dropped_by,
        config.item_public_ticks,
        config.item_despawn_ticks,
    ))?;
    Ok(Entity::new(id, format!("item {}", item_id), position, components))
}

/// Current persistent state of a player entity.
pub fn profile_of(entity: &Entity) -> Option<PlayerProfile> {
    let player = entity.get::<PlayerComponent>()?;
    Some(PlayerProfile {
        username: player.username().to_owned(),
        rights: player.rights(),
        position: entity.transform().position(),
        appearance: entity
            .get::<AppearanceComponent>()
            .map(|a| a.appearance().clone())
            .unwrap_or_default(),
        hitpoints: entity
            .get::<HealthComponent>()
            .map(|h| h.current())
            .unwrap_or(crate::accounts::DEFAULT_HITPOINTS),
    })
}
