//! Concrete components. Priorities decide the order each entity's components
//! see a message: state owners first, then the flag accumulator that records
//! what changed, then the network binding that ships it.

mod appearance;
mod flags;
mod ground_item;
mod health;
mod movement;
mod network;
mod player;
mod vision;

pub use appearance::AppearanceComponent;
pub use flags::FlagsComponent;
pub use ground_item::GroundItemComponent;
pub use health::HealthComponent;
pub use movement::{MovementComponent, MAX_WALK_DISTANCE};
pub use network::{
    ClientInlet, ConnectionLink, NetworkComponent, RemoteEnd, SessionKeys, MAX_BUFFERED_INBOUND,
};
pub use player::PlayerComponent;
pub use vision::VisionComponent;

pub const PLAYER_PRIORITY: i32 = 0;
pub const GROUND_ITEM_PRIORITY: i32 = 0;
pub const APPEARANCE_PRIORITY: i32 = 10;
pub const HEALTH_PRIORITY: i32 = 20;
pub const MOVEMENT_PRIORITY: i32 = 30;
pub const VISION_PRIORITY: i32 = 40;
pub const FLAGS_PRIORITY: i32 = 50;
pub const NETWORK_PRIORITY: i32 = 60;
