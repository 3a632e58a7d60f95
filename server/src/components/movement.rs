use super::MOVEMENT_PRIORITY;
use crate::directions::{DirectionsProvider, FollowDirections, WaypointDirections};
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityId, EntityMessage};
use log::debug;
use shared::packets::{opcodes, FollowRequest, InboundPacket, WalkRequest};
use shared::Frame;
use std::any::Any;

/// Furthest a walk request's reference tile may be from the walker.
pub const MAX_WALK_DISTANCE: i32 = 104;

/// Owns the directions provider the movement phase steps each tick.
#[derive(Default)]
pub struct MovementComponent {
    provider: Option<Box<dyn DirectionsProvider>>,
    following: Option<EntityId>,
    running: bool,
}

impl std::fmt::Debug for MovementComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementComponent")
            .field("moving", &self.provider.is_some())
            .field("following", &self.following)
            .field("running", &self.running)
            .finish()
    }
}

impl MovementComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_moving(&self) -> bool {
        self.provider.is_some()
    }

    pub fn following(&self) -> Option<EntityId> {
        self.following
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Replaces the current provider.
    pub fn set_provider(&mut self, provider: Box<dyn DirectionsProvider>) {
        self.provider = Some(provider);
    }

    /// Lends the provider out for one movement step.
    pub fn take_provider(&mut self) -> Option<Box<dyn DirectionsProvider>> {
        self.provider.take()
    }

    /// Returns a lent provider unless a new one was set meanwhile.
    pub fn restore_provider(&mut self, provider: Box<dyn DirectionsProvider>) {
        if self.provider.is_none() {
            self.provider = Some(provider);
        }
    }

    fn stop(&mut self, ctx: &mut EntityContext<'_>) {
        if self.provider.take().is_some() {
            ctx.emit(Capability::Movement, EntityEvent::StopMovingAlongMovePath);
        }
        self.stop_following(ctx);
    }

    fn stop_following(&mut self, ctx: &mut EntityContext<'_>) {
        if self.following.take().is_some() {
            ctx.emit(Capability::Movement, EntityEvent::NewInteractingEntity(None));
        }
    }

    fn handle_packet(&mut self, ctx: &mut EntityContext<'_>, frame: &Frame) {
        match frame.opcode {
            opcodes::WALK => match WalkRequest::from_payload(&frame.payload) {
                Ok(walk) => self.walk(ctx, walk),
                Err(err) => debug!("Entity {} sent a bad walk packet: {}", ctx.id, err),
            },
            opcodes::FOLLOW => match FollowRequest::from_payload(&frame.payload) {
                Ok(follow) => self.follow(ctx, EntityId(u32::from(follow.target))),
                Err(err) => debug!("Entity {} sent a bad follow packet: {}", ctx.id, err),
            },
            _ => {}
        }
    }

    fn walk(&mut self, ctx: &mut EntityContext<'_>, walk: WalkRequest) {
        let position = ctx.transform.position();
        let reference = (i32::from(walk.reference_x), i32::from(walk.reference_y));
        let distance = (reference.0 - position.x)
            .abs()
            .max((reference.1 - position.y).abs());
        if distance > MAX_WALK_DISTANCE {
            debug!(
                "Entity {} asked to walk from {:?}, {} tiles away",
                ctx.id, reference, distance
            );
            return;
        }
        self.stop_following(ctx);
        self.provider = Some(Box::new(WaypointDirections::new(
            reference,
            &walk.waypoints,
            self.running,
        )));
        ctx.emit(Capability::Movement, EntityEvent::BeginMovePath);
    }

    fn follow(&mut self, ctx: &mut EntityContext<'_>, target: EntityId) {
        if target == ctx.id {
            return;
        }
        self.provider = Some(Box::new(FollowDirections::new(target)));
        self.following = Some(target);
        ctx.emit(Capability::Movement, EntityEvent::NewPlayerFollowTarget(target));
        ctx.emit(
            Capability::Movement,
            EntityEvent::NewInteractingEntity(Some(target)),
        );
        ctx.emit(Capability::Movement, EntityEvent::BeginMovePath);
    }
}

impl Component for MovementComponent {
    fn capability(&self) -> Capability {
        Capability::Movement
    }

    fn priority(&self) -> i32 {
        MOVEMENT_PRIORITY
    }

    fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        match &message.event {
            EntityEvent::NewPacket(frame) => self.handle_packet(ctx, frame),
            EntityEvent::Teleport { .. } | EntityEvent::JustDied => self.stop(ctx),
            EntityEvent::ArrivedAtDestination => self.stop_following(ctx),
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
