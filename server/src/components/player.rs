use super::PLAYER_PRIORITY;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityMessage};
use crate::update::ChatLine;
use log::debug;
use shared::packets::{opcodes, ChatRequest, InboundPacket};
use std::any::Any;

/// Account identity of a logged-in player.
#[derive(Debug)]
pub struct PlayerComponent {
    username: String,
    rights: u8,
    save_requested: bool,
}

impl PlayerComponent {
    pub fn new(username: impl Into<String>, rights: u8) -> Self {
        Self {
            username: username.into(),
            rights,
            save_requested: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn rights(&self) -> u8 {
        self.rights
    }

    /// Returns and clears a pending request to persist this player.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }
}

impl Component for PlayerComponent {
    fn capability(&self) -> Capability {
        Capability::Player
    }

    fn priority(&self) -> i32 {
        PLAYER_PRIORITY
    }

    fn receive(&mut self, ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        match &message.event {
            EntityEvent::NewPacket(frame) if frame.opcode == opcodes::CHAT => {
                match ChatRequest::from_payload(&frame.payload) {
                    Ok(chat) => ctx.emit(
                        Capability::Player,
                        EntityEvent::ChatMessage(ChatLine {
                            effects: chat.effects,
                            color: chat.color,
                            rights: self.rights,
                            text: chat.text,
                            forced: false,
                        }),
                    ),
                    Err(err) => debug!("Dropping bad chat packet from {}: {}", self.username, err),
                }
            }
            EntityEvent::DatabaseUpdate => self.save_requested = true,
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
