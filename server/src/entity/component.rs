use super::{EntityContext, EntityMessage};
use crate::error::EntityError;
use std::any::Any;
use std::fmt;

/// The capability a component provides. An entity holds at most one
/// component per capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Player,
    Appearance,
    Health,
    Movement,
    Vision,
    UpdateFlags,
    Network,
    GroundItem,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Player => "player",
            Self::Appearance => "appearance",
            Self::Health => "health",
            Self::Movement => "movement",
            Self::Vision => "vision",
            Self::UpdateFlags => "update flags",
            Self::Network => "network",
            Self::GroundItem => "ground item",
        };
        f.write_str(name)
    }
}

/// A unit of entity behaviour driven by messages.
pub trait Component: Any + Send {
    fn capability(&self) -> Capability;

    /// Capabilities that must already be attached before this one.
    fn requires(&self) -> &'static [Capability] {
        &[]
    }

    /// Lower priorities receive each message first.
    fn priority(&self) -> i32;

    fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Components of one entity, kept sorted by priority.
#[derive(Default)]
pub struct ComponentSet {
    components: Vec<Box<dyn Component>>,
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.capabilities()).finish()
    }
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a component after checking its requirements.
    ///
    /// Components with equal priority keep their attach order.
    pub fn attach<C: Component>(&mut self, component: C) -> Result<(), EntityError> {
        let capability = component.capability();
        if self.has(capability) {
            return Err(EntityError::DuplicateComponent(capability));
        }
        if let Some(missing) = component
            .requires()
            .iter()
            .copied()
            .find(|required| !self.has(*required))
        {
            return Err(EntityError::UnsatisfiedComponentRequirement {
                component: capability,
                missing,
            });
        }

        let priority = component.priority();
        let index = self
            .components
            .partition_point(|existing| existing.priority() <= priority);
        self.components.insert(index, Box::new(component));
        Ok(())
    }

    /// Builder form of [`attach`](Self::attach).
    pub fn with<C: Component>(mut self, component: C) -> Result<Self, EntityError> {
        self.attach(component)?;
        Ok(self)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.components
            .iter()
            .any(|component| component.capability() == capability)
    }

    /// Capabilities in dispatch order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.components.iter().map(|component| component.capability())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|component| component.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<T>())
    }

    pub(crate) fn dispatch(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        for component in self.components.iter_mut() {
            component.receive(ctx, message);
        }
    }
}
