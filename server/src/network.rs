//! Socket plumbing and the tick loop driving the [`World`].

use crate::accounts::{AccountStore, PlayerProfile};
use crate::components::ConnectionLink;
use crate::config::ServerConfig;
use crate::crypto::LoginKey;
use crate::directory::PlayerDirectory;
use crate::error::{InboundError, ServerError};
use crate::game::{TickSummary, World};
use crate::gate::{ClientStream, ConnectionGate, LoginRequest};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Bytes read from a client socket per read call.
const READ_CHUNK: usize = 512;

/// Owns the listener, the login gate and the world.
pub struct Server {
    config: Arc<ServerConfig>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    gate: Arc<ConnectionGate>,
    accounts: Arc<dyn AccountStore>,
    world: World,
    login_rx: mpsc::UnboundedReceiver<LoginRequest>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        key: LoginKey,
        accounts: Arc<dyn AccountStore>,
    ) -> Result<Self, ServerError> {
        let address = config.address();
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { address, source })?;
        info!("Server listening on {}", local_addr);

        let config = Arc::new(config);
        let directory = PlayerDirectory::new();
        let (login_tx, login_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(ConnectionGate::new(
            Arc::clone(&config),
            Arc::new(key),
            Arc::clone(&accounts),
            directory.clone(),
            login_tx,
        ));

        Ok(Server {
            world: World::new(Arc::clone(&config), directory),
            config,
            listener: Some(listener),
            local_addr,
            gate,
            accounts,
            login_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Switch that refuses new logins with `LoginServerOffline` when cleared.
    pub fn login_switch(&self) -> Arc<AtomicBool> {
        self.gate.login_switch()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Starts accepting connections. Called by [`Server::run`]; tests that
    /// drive ticks by hand call it directly.
    pub fn start_listening(&mut self) -> Option<JoinHandle<()>> {
        let listener = self.listener.take()?;
        let gate = Arc::clone(&self.gate);
        Some(tokio::spawn(gate.listen(listener)))
    }

    /// Runs the tick loop until ctrl-c, then saves every player.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let listen_handle = self.start_listening();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started, ticking every {}ms",
            self.config.tick_duration().as_millis()
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let summary = self.process_tick();
                    if summary.tick % 100 == 0 {
                        debug!(
                            "Tick {}: {} entities, {} clients, {} bytes sent",
                            summary.tick, summary.entities, summary.clients, summary.bytes_sent
                        );
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    break;
                }
            }
        }

        if let Some(handle) = listen_handle {
            handle.abort();
        }
        let players = self.world.snapshot_players();
        info!("Saving {} players before exit", players.len());
        if let Err(e) = self.save_profiles(players).await {
            error!("Final save task failed: {}", e);
        }
        Ok(())
    }

    /// Admits waiting logins and runs one world tick.
    pub fn process_tick(&mut self) -> TickSummary {
        while let Ok(request) = self.login_rx.try_recv() {
            let (ticket, stream) = request.into_parts();
            let username = ticket.username.clone();
            let link = spawn_connection(stream);
            if let Err(e) = self.world.accept_login(ticket, link) {
                warn!("Could not place {} in the world: {}", username, e);
            }
        }

        let summary = self.world.tick();

        let saves = self.world.take_pending_saves();
        if !saves.is_empty() {
            let handle = self.spawn_saves(saves);
            tokio::spawn(async move {
                if let Err(e) = handle.await {
                    error!("Save task failed: {}", e);
                }
            });
        }
        summary
    }

    fn spawn_saves(&self, profiles: Vec<PlayerProfile>) -> JoinHandle<()> {
        let accounts = Arc::clone(&self.accounts);
        tokio::task::spawn_blocking(move || {
            for profile in profiles {
                match accounts.save(&profile) {
                    Ok(()) => debug!("Saved {}", profile.username),
                    Err(e) => error!("Failed to save {}: {}", profile.username, e),
                }
            }
        })
    }

    async fn save_profiles(&self, profiles: Vec<PlayerProfile>) -> Result<(), tokio::task::JoinError> {
        self.spawn_saves(profiles).await
    }
}

/// Splits an authenticated stream into a reader and a writer task and
/// returns the tick loop's end of them.
///
/// The reader forwards raw bytes until EOF, an error or a client that runs
/// too far ahead of the tick loop, and then drops its sender, which the
/// network component sees as a disconnect. The writer
/// drains outbound batches until the tick loop drops its sender.
pub fn spawn_connection(stream: Box<dyn ClientStream>) -> ConnectionLink {
    let (link, remote) = ConnectionLink::pair();
    let (mut reader, mut writer) = tokio::io::split(stream);
    let from_client = remote.from_client;
    let mut to_client = remote.to_client;

    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(len) => match from_client.forward(chunk[..len].to_vec()) {
                    Ok(()) => {}
                    Err(InboundError::Closed) => break,
                    Err(err) => {
                        warn!("Dropping client connection: {}", err);
                        break;
                    }
                },
                Err(e) => {
                    debug!("Error reading from client: {}", e);
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(batch) = to_client.recv().await {
            if let Err(e) = writer.write_all(&batch).await {
                debug!("Error writing to client: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                debug!("Error flushing client socket: {}", e);
                break;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Error shutting down client socket: {}", e);
        }
    });

    link
}
