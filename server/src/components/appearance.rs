use super::APPEARANCE_PRIORITY;
use crate::accounts::Appearance;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityMessage};
use crate::update::AppearanceBlock;
use std::any::Any;

/// How a player looks to others. Re-announced whenever someone new starts
/// watching, since their client has no copy yet.
#[derive(Debug)]
pub struct AppearanceComponent {
    display_name: String,
    appearance: Appearance,
    definition: Option<u16>,
}

impl AppearanceComponent {
    pub fn new(display_name: impl Into<String>, appearance: Appearance) -> Self {
        Self {
            display_name: display_name.into(),
            appearance,
            definition: None,
        }
    }

    pub fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    pub fn definition(&self) -> Option<u16> {
        self.definition
    }

    pub fn block(&self) -> AppearanceBlock {
        AppearanceBlock {
            username: self.display_name.clone(),
            appearance: self.appearance.clone(),
            definition: self.definition,
        }
    }
}

impl Component for AppearanceComponent {
    fn capability(&self) -> Capability {
        Capability::Appearance
    }

    fn priority(&self) -> i32 {
        APPEARANCE_PRIORITY
    }

    fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        match &message.event {
            EntityEvent::ObservedBy(_) | EntityEvent::NetworkReinitialize => {}
            EntityEvent::DefinitionChange(definition) => self.definition = *definition,
            _ => return,
        }
        ctx.emit(Capability::Appearance, EntityEvent::AppearanceChanged(self.block()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
