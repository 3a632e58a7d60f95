use super::NETWORK_PRIORITY;
use crate::entity::{Capability, Component, EntityContext, EntityEvent, EntityId, EntityMessage};
use log::{debug, warn};
use shared::packets::{OutboundPacket, SystemMessage, MAX_SYSTEM_MESSAGE_CHARS};
use shared::protocol::{SERVER_KEY_SIZE, SESSION_KEY_COUNT};
use shared::{Frame, FramedBuffer};
use std::any::Any;
use crate::error::InboundError;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Unparsed inbound bytes a client may have buffered before it is dropped.
pub const MAX_BUFFERED_INBOUND: usize = 5000;

/// Key material negotiated during the handshake, kept for the packet cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionKeys {
    pub session: [i32; SESSION_KEY_COUNT],
    pub server_key: [u8; SERVER_KEY_SIZE],
}

/// The tick loop's side of a client socket.
#[derive(Debug)]
pub struct ConnectionLink {
    outbound: UnboundedSender<Vec<u8>>,
    inbound: UnboundedReceiver<Vec<u8>>,
    pending: Arc<AtomicUsize>,
}

/// Feeds bytes read from a client socket to the tick loop, counting what
/// the tick loop has not taken yet.
#[derive(Debug, Clone)]
pub struct ClientInlet {
    sender: UnboundedSender<Vec<u8>>,
    pending: Arc<AtomicUsize>,
}

/// The socket tasks' side of a [`ConnectionLink`].
#[derive(Debug)]
pub struct RemoteEnd {
    pub to_client: UnboundedReceiver<Vec<u8>>,
    pub from_client: ClientInlet,
}

impl ConnectionLink {
    pub fn pair() -> (ConnectionLink, RemoteEnd) {
        let (outbound, to_client) = unbounded_channel();
        let (sender, inbound) = unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        (
            ConnectionLink {
                outbound,
                inbound,
                pending: Arc::clone(&pending),
            },
            RemoteEnd {
                to_client,
                from_client: ClientInlet { sender, pending },
            },
        )
    }

    fn take_inbound(&mut self) -> Result<Vec<u8>, TryRecvError> {
        let bytes = self.inbound.try_recv()?;
        self.pending.fetch_sub(bytes.len(), Ordering::AcqRel);
        Ok(bytes)
    }
}

impl ClientInlet {
    /// Queues bytes for the tick loop.
    ///
    /// Refuses once the client is more than [`MAX_BUFFERED_INBOUND`] bytes
    /// ahead of the tick loop, so a flooding client is cut off between ticks.
    pub fn forward(&self, bytes: Vec<u8>) -> Result<(), InboundError> {
        let len = bytes.len();
        let pending = self.pending.fetch_add(len, Ordering::AcqRel) + len;
        if pending > MAX_BUFFERED_INBOUND {
            self.pending.fetch_sub(len, Ordering::AcqRel);
            return Err(InboundError::Overflow { pending });
        }
        if self.sender.send(bytes).is_err() {
            self.pending.fetch_sub(len, Ordering::AcqRel);
            return Err(InboundError::Closed);
        }
        Ok(())
    }

    /// Bytes forwarded but not yet taken by the tick loop.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Binds an entity to a client connection.
///
/// Inbound bytes are reassembled into frames and handed to the other
/// components as `NewPacket` messages by the world. Outbound packets are
/// collected over the tick and flushed once after the sync phase.
#[derive(Debug)]
pub struct NetworkComponent {
    signlink: i32,
    keys: SessionKeys,
    link: Option<ConnectionLink>,
    inbound: FramedBuffer,
    outbound: FramedBuffer,
    known: BTreeSet<EntityId>,
    needs_rebase: bool,
    disconnected_ticks: u32,
}

impl NetworkComponent {
    pub fn new(signlink: i32, keys: SessionKeys, link: ConnectionLink) -> Self {
        Self {
            signlink,
            keys,
            link: Some(link),
            inbound: FramedBuffer::default(),
            outbound: FramedBuffer::with_capacity(1024),
            known: BTreeSet::new(),
            needs_rebase: true,
            disconnected_ticks: 0,
        }
    }

    pub fn signlink(&self) -> i32 {
        self.signlink
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Ticks spent without a connection.
    pub fn disconnected_ticks(&self) -> u32 {
        self.disconnected_ticks
    }

    /// Attaches a fresh connection after a reconnect. The client starts
    /// from nothing, so everything it knew is forgotten.
    pub fn rebind(&mut self, link: ConnectionLink, keys: SessionKeys) {
        self.link = Some(link);
        self.keys = keys;
        self.inbound.reset_cursors();
        self.outbound.reset_cursors();
        self.known.clear();
        self.needs_rebase = true;
        self.disconnected_ticks = 0;
    }

    pub fn disconnect(&mut self) {
        self.link = None;
    }

    /// Entities the client has been told about.
    pub fn known(&self) -> &BTreeSet<EntityId> {
        &self.known
    }

    pub fn set_known(&mut self, known: BTreeSet<EntityId>) {
        self.known = known;
    }

    /// Returns and clears a pending full region rebase.
    pub fn take_rebase(&mut self) -> bool {
        std::mem::take(&mut self.needs_rebase)
    }

    pub fn outbound_mut(&mut self) -> &mut FramedBuffer {
        &mut self.outbound
    }

    /// Drains the socket and returns every complete frame.
    pub fn poll_inbound(&mut self) -> Vec<Frame> {
        let Some(link) = self.link.as_mut() else {
            self.disconnected_ticks = self.disconnected_ticks.saturating_add(1);
            return Vec::new();
        };
        loop {
            match link.take_inbound() {
                Ok(bytes) => {
                    self.inbound.compact();
                    if let Err(err) = self.inbound.write_block(&bytes) {
                        warn!("Inbound buffer rejected {} bytes: {}", bytes.len(), err);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Client socket closed");
                    self.link = None;
                    break;
                }
            }
        }

        let mut frames = Vec::new();
        loop {
            match self.inbound.read_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) => {
                    warn!("Dropping unreadable inbound data: {}", err);
                    self.inbound.reset_cursors();
                    break;
                }
            }
        }
        if self.inbound.remaining() > MAX_BUFFERED_INBOUND {
            warn!(
                "Client buffered {} bytes without a complete frame, disconnecting",
                self.inbound.remaining()
            );
            self.inbound.reset_cursors();
            self.link = None;
        }
        frames
    }

    /// Sends everything written this tick. Returns the number of bytes sent.
    pub fn flush(&mut self) -> usize {
        let written = self.outbound.written().len();
        if written == 0 {
            return 0;
        }
        let sent = match &self.link {
            Some(link) => link.outbound.send(self.outbound.written().to_vec()).is_ok(),
            None => false,
        };
        self.outbound.reset_cursors();
        if sent {
            written
        } else {
            0
        }
    }

    fn send_system_message(&mut self, text: &str) {
        let mut end = text.len().min(MAX_SYSTEM_MESSAGE_CHARS);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let packet = SystemMessage {
            text: text[..end].to_owned(),
        };
        if let Err(err) = packet.send(&mut self.outbound) {
            warn!("Failed to queue system message: {}", err);
        }
    }
}

impl Component for NetworkComponent {
    fn capability(&self) -> Capability {
        Capability::Network
    }

    fn requires(&self) -> &'static [Capability] {
        &[Capability::Player, Capability::Vision, Capability::UpdateFlags]
    }

    fn priority(&self) -> i32 {
        NETWORK_PRIORITY
    }

    fn receive(&mut self, _ctx: &mut EntityContext<'_>, message: &EntityMessage) {
        match &message.event {
            EntityEvent::NewSystemMessage(text) => self.send_system_message(text),
            EntityEvent::NetworkReinitialize => {
                self.known.clear();
                self.needs_rebase = true;
            }
            EntityEvent::DestroyEntity => {
                self.flush();
                self.link = None;
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
