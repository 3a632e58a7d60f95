use super::HEALTH_PRIORITY;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityMessage};
use crate::update::Hit;
use std::any::Any;

#[derive(Debug)]
pub struct HealthComponent {
    current: u8,
    max: u8,
}

impl HealthComponent {
    pub fn new(current: u8, max: u8) -> Self {
        Self {
            current: current.min(max),
            max,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn is_dead(&self) -> bool {
        self.current == 0
    }
}

impl Component for HealthComponent {
    fn capability(&self) -> Capability {
        Capability::Health
    }

    fn priority(&self) -> i32 {
        HEALTH_PRIORITY
    }

    fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        match &message.event {
            EntityEvent::Damage(request) => {
                if self.is_dead() {
                    return;
                }
                let damage = request.amount.min(self.current);
                self.current -= damage;
                ctx.emit(
                    Capability::Health,
                    EntityEvent::TookDamage(Hit {
                        damage,
                        kind: request.kind,
                        current: self.current,
                        max: self.max,
                    }),
                );
                if self.is_dead() {
                    ctx.emit(Capability::Health, EntityEvent::JustDied);
                }
            }
            EntityEvent::Heal(amount) => {
                let healed = (*amount).min(self.max - self.current);
                if healed > 0 {
                    self.current += healed;
                    ctx.emit(Capability::Health, EntityEvent::HealedHealth(healed));
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{FlagsComponent, MovementComponent};
    use crate::directions::FollowDirections;
    use crate::entity::{ComponentSet, DamageRequest, Entity, EntityId};
    use crate::transform::Position;
    use crate::update::{FlagKind, Observer, UpdateFlag};

    /// Counts deaths announced to the entity.
    #[derive(Debug, Default)]
    struct DeathCounter(u32);

    impl Component for DeathCounter {
        fn capability(&self) -> Capability {
            Capability::Player
        }

        fn priority(&self) -> i32 {
            0
        }

        fn receive(&mut self, _ctx: &mut EntityContext<'_>, message: &EntityMessage) {
            if message.event == EntityEvent::JustDied {
                self.0 += 1;
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn fighter(current: u8, max: u8) -> Entity {
        let components = ComponentSet::new()
            .with(DeathCounter::default())
            .unwrap()
            .with(HealthComponent::new(current, max))
            .unwrap()
            .with(MovementComponent::new())
            .unwrap()
            .with(FlagsComponent::new())
            .unwrap();
        Entity::new(EntityId(1), "fighter", Position::new(3200, 3200, 0), components)
    }

    fn hit(entity: &mut Entity, amount: u8) {
        entity.send_event(EntityEvent::Damage(DamageRequest { amount, kind: 1 }));
    }

    fn raised(entity: &Entity, kind: FlagKind) -> Option<UpdateFlag> {
        entity.get::<FlagsComponent>()?.flags().get(kind).cloned()
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let mut entity = fighter(5, 10);
        hit(&mut entity, 8);
        let health = entity.get::<HealthComponent>().unwrap();
        assert_eq!(health.current(), 0);
        assert!(health.is_dead());
        assert_eq!(
            raised(&entity, FlagKind::PrimaryHit),
            Some(UpdateFlag::PrimaryHit(Hit {
                damage: 5,
                kind: 1,
                current: 0,
                max: 10,
            }))
        );
    }

    #[test]
    fn test_death_is_announced_once() {
        let mut entity = fighter(3, 10);
        hit(&mut entity, 3);
        hit(&mut entity, 3);
        entity.send_event(EntityEvent::FrameEnd);
        hit(&mut entity, 3);
        assert_eq!(entity.get::<DeathCounter>().unwrap().0, 1);
        // hits on a dead entity raise nothing
        assert!(!entity
            .get::<FlagsComponent>()
            .unwrap()
            .flags()
            .needs_update(Observer::Other));
    }

    #[test]
    fn test_death_stops_movement() {
        let mut entity = fighter(1, 10);
        entity
            .get_mut::<MovementComponent>()
            .unwrap()
            .set_provider(Box::new(FollowDirections::new(EntityId(2))));
        assert!(entity.get::<MovementComponent>().unwrap().is_moving());
        hit(&mut entity, 1);
        assert!(!entity.get::<MovementComponent>().unwrap().is_moving());
    }

    #[test]
    fn test_heal_caps_at_max() {
        let mut entity = fighter(4, 10);
        entity.send_event(EntityEvent::Heal(50));
        assert_eq!(entity.get::<HealthComponent>().unwrap().current(), 10);
        entity.send_event(EntityEvent::Heal(1));
        assert_eq!(entity.get::<HealthComponent>().unwrap().current(), 10);
    }

    #[test]
    fn test_second_hit_in_a_tick_is_secondary() {
        let mut entity = fighter(10, 10);
        hit(&mut entity, 2);
        hit(&mut entity, 3);
        let flags = entity.get::<FlagsComponent>().unwrap().flags();
        assert_eq!(
            flags.header(Observer::Other),
            FlagKind::PrimaryHit.bit() | FlagKind::SecondaryHit.bit()
        );
        assert!(matches!(
            flags.get(FlagKind::SecondaryHit),
            Some(UpdateFlag::SecondaryHit(Hit { damage: 3, current: 5, .. }))
        ));

        entity.send_event(EntityEvent::FrameEnd);
        hit(&mut entity, 1);
        let flags = entity.get::<FlagsComponent>().unwrap().flags();
        assert_eq!(flags.header(Observer::Other), FlagKind::PrimaryHit.bit());
    }
}
