//! The login handshake, run once per accepted socket on its own task.
//!
//! A connection moves `AwaitingHandshake -> AwaitingCredentials -> Accepted`
//! or ends `Rejected` after exactly one response code. Accepted connections
//! are handed to the tick loop as a [`LoginRequest`]; nothing here touches
//! an entity.

use crate::accounts::{AccountStore, PlayerProfile};
use crate::components::SessionKeys;
use crate::config::ServerConfig;
use crate::crypto::{generate_session_key, LoginKey};
use crate::directory::{PlayerDirectory, ReserveError};
use crate::entity::EntityId;
use crate::error::HandshakeError;
use log::{debug, error, info, warn};
use shared::protocol::{
    CredentialBody, CredentialHeader, LoginKind, HANDSHAKE_MAGIC, HANDSHAKE_PADDING,
};
use shared::{FramedBuffer, InitResponseCode};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;

/// Byte stream a client talks over.
pub trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ClientStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingHandshake,
    AwaitingCredentials,
    Accepted,
    Rejected,
}

/// What the tick loop should do with an accepted login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    New(PlayerProfile),
    Reconnect(EntityId),
}

/// Everything about an accepted login except its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicket {
    pub username: String,
    pub signlink: i32,
    pub keys: SessionKeys,
    pub low_memory: bool,
    pub outcome: LoginOutcome,
}

/// An authenticated connection waiting for the tick loop.
pub struct LoginRequest {
    pub ticket: LoginTicket,
    pub stream: Box<dyn ClientStream>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

impl LoginRequest {
    pub fn into_parts(self) -> (LoginTicket, Box<dyn ClientStream>) {
        (self.ticket, self.stream)
    }
}

/// Authenticates sockets and hands them to the tick loop.
pub struct ConnectionGate {
    config: Arc<ServerConfig>,
    key: Arc<LoginKey>,
    accounts: Arc<dyn AccountStore>,
    directory: PlayerDirectory,
    login_enabled: Arc<AtomicBool>,
    logins: UnboundedSender<LoginRequest>,
}

impl ConnectionGate {
    pub fn new(
        config: Arc<ServerConfig>,
        key: Arc<LoginKey>,
        accounts: Arc<dyn AccountStore>,
        directory: PlayerDirectory,
        logins: UnboundedSender<LoginRequest>,
    ) -> Self {
        let login_enabled = Arc::new(AtomicBool::new(!config.login_disabled));
        Self {
            config,
            key,
            accounts,
            directory,
            login_enabled,
            logins,
        }
    }

    /// Shared switch for refusing logins at runtime.
    pub fn login_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.login_enabled)
    }

    /// Accepts connections forever, one handshake task per socket.
    pub async fn listen(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not disable Nagle for {}: {}", addr, e);
                    }
                    let gate = Arc::clone(&self);
                    tokio::spawn(async move {
                        let code = gate.handle(stream).await;
                        debug!("Handshake with {} ended with {:?}", addr, code);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Runs one handshake to completion and returns the code sent.
    pub async fn handle<S: ClientStream>(&self, mut stream: S) -> InitResponseCode {
        let mut state = ConnectionState::AwaitingHandshake;
        match self.handshake(&mut stream, &mut state).await {
            Ok((code, ticket)) => {
                let username = ticket.username.clone();
                let reserved = matches!(ticket.outcome, LoginOutcome::New(_));
                let request = LoginRequest {
                    ticket,
                    stream: Box::new(stream),
                };
                if self.logins.send(request).is_err() {
                    error!("Tick loop is gone, dropping login for {}", username);
                    if reserved {
                        self.directory.remove(&username);
                    }
                    return InitResponseCode::GeneralFailure;
                }
                info!("{} passed the login gate ({:?})", username, code);
                code
            }
            Err(err) => {
                let code = err.response_code();
                match &err {
                    HandshakeError::AuthenticationFailure { .. } | HandshakeError::Refused(_) => {
                        info!("Login rejected: {}", err)
                    }
                    _ => warn!("Handshake failed: {}", err),
                }
                self.reject(&mut stream, state, code).await;
                code
            }
        }
    }

    async fn reject<S: ClientStream>(&self, stream: &mut S, state: ConnectionState, code: InitResponseCode) {
        let mut reply = Vec::with_capacity(HANDSHAKE_PADDING + 1);
        if state == ConnectionState::AwaitingHandshake {
            reply.resize(HANDSHAKE_PADDING, 0);
        }
        reply.push(code.as_byte());
        if let Err(e) = self.send(stream, &reply).await {
            debug!("Could not deliver rejection {:?}: {}", code, e);
        }
        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown after rejection {:?} failed: {}", code, e);
        }
    }

    async fn handshake<S: ClientStream>(
        &self,
        stream: &mut S,
        state: &mut ConnectionState,
    ) -> Result<(InitResponseCode, LoginTicket), HandshakeError> {
        let mut probe = [0u8; 2];
        self.receive(stream, &mut probe).await?;
        if probe[0] != HANDSHAKE_MAGIC {
            return Err(HandshakeError::protocol(
                InitResponseCode::GeneralFailure,
                format!("bad handshake magic {}", probe[0]),
            ));
        }
        if self.directory.len() >= self.config.max_players {
            return Err(HandshakeError::Refused(InitResponseCode::WorldIsFull));
        }
        if !self.login_enabled.load(Ordering::Relaxed) {
            return Err(HandshakeError::Refused(InitResponseCode::LoginServerOffline));
        }

        let server_key = generate_session_key();
        let mut reply = FramedBuffer::with_capacity(HANDSHAKE_PADDING + 1 + server_key.len());
        reply.write_block(&[0; HANDSHAKE_PADDING])?;
        reply.write_u8(InitResponseCode::ContinueToCredentials.as_byte())?;
        reply.write_block(&server_key)?;
        self.send(stream, reply.written()).await?;
        *state = ConnectionState::AwaitingCredentials;

        let mut block = vec![0u8; self.key.block_size()];
        self.receive(stream, &mut block).await?;
        let plain = self.key.decrypt(&block)?;
        let mut buf = FramedBuffer::from_bytes(&plain);

        let header = CredentialHeader::decode(&mut buf)?;
        if header.revision != self.config.revision {
            return Err(HandshakeError::protocol(
                InitResponseCode::MustUpdate,
                format!(
                    "client revision {} does not match {}",
                    header.revision, self.config.revision
                ),
            ));
        }
        let body = CredentialBody::decode(&mut buf)?;

        let (code, outcome) = match header.kind {
            LoginKind::Reconnect => (
                InitResponseCode::ReconnectDone,
                LoginOutcome::Reconnect(self.authorize_reconnect(&body)?),
            ),
            LoginKind::New => (
                InitResponseCode::LoginDone,
                LoginOutcome::New(self.authorize_new(&body)?),
            ),
        };

        let mut response = vec![code.as_byte()];
        if let LoginOutcome::New(profile) = &outcome {
            // flagged account, then title
            response.push(0);
            response.push(profile.rights);
        }
        if let Err(err) = self.send(stream, &response).await {
            if matches!(outcome, LoginOutcome::New(_)) {
                self.directory.remove(&body.username);
            }
            return Err(err);
        }
        *state = ConnectionState::Accepted;

        Ok((
            code,
            LoginTicket {
                username: body.username,
                signlink: body.signlink_uid,
                keys: SessionKeys {
                    session: body.session_keys,
                    server_key,
                },
                low_memory: header.low_memory,
                outcome,
            },
        ))
    }

    fn authorize_reconnect(&self, body: &CredentialBody) -> Result<EntityId, HandshakeError> {
        let presence = self
            .directory
            .get(&body.username)
            .filter(|presence| presence.entity.is_some())
            .ok_or_else(|| {
                HandshakeError::authentication(
                    InitResponseCode::GeneralFailure,
                    format!("{} is not in the world", body.username),
                )
            })?;
        match presence.signlink {
            Some(bound) if bound == body.signlink_uid => {}
            _ => {
                return Err(HandshakeError::authentication(
                    InitResponseCode::GeneralFailure,
                    format!("{} can't be reconnected from this client", body.username),
                ))
            }
        }
        if !self.accounts.is_valid_password(&body.username, &body.password) {
            return Err(HandshakeError::authentication(
                InitResponseCode::InvalidCredentials,
                format!("bad password for {}", body.username),
            ));
        }
        presence.entity.ok_or_else(|| {
            HandshakeError::authentication(InitResponseCode::GeneralFailure, "presence lost its entity")
        })
    }

    fn authorize_new(&self, body: &CredentialBody) -> Result<PlayerProfile, HandshakeError> {
        let username = &body.username;
        if self.directory.contains(username) {
            return Err(HandshakeError::authentication(
                InitResponseCode::AccountAlreadyLoggedIn,
                format!("{} is already logged in", username),
            ));
        }

        let profile = if self.accounts.exists(username) {
            if !self.accounts.is_valid_password(username, &body.password) {
                return Err(HandshakeError::authentication(
                    InitResponseCode::InvalidCredentials,
                    format!("bad password for {}", username),
                ));
            }
            self.accounts.load(username).map_err(|err| {
                HandshakeError::authentication(InitResponseCode::GeneralFailure, err.to_string())
            })?
        } else {
            info!("Creating account {}", username);
            self.accounts.create(username, &body.password).map_err(|err| {
                HandshakeError::authentication(InitResponseCode::GeneralFailure, err.to_string())
            })?
        };

        match self.directory.try_reserve(username, self.config.max_players) {
            Ok(()) => Ok(profile),
            Err(ReserveError::Taken) => Err(HandshakeError::authentication(
                InitResponseCode::AccountAlreadyLoggedIn,
                format!("{} logged in concurrently", username),
            )),
            Err(ReserveError::Full) => Err(HandshakeError::Refused(InitResponseCode::WorldIsFull)),
        }
    }

    async fn receive<S: ClientStream>(&self, stream: &mut S, buf: &mut [u8]) -> Result<(), HandshakeError> {
        with_timeout(self.config.receive_timeout(), stream.read_exact(buf)).await?;
        Ok(())
    }

    async fn send<S: ClientStream>(&self, stream: &mut S, bytes: &[u8]) -> Result<(), HandshakeError> {
        with_timeout(self.config.send_timeout(), async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
    }
}

async fn with_timeout<T>(
    limit: Duration,
    io: impl Future<Output = std::io::Result<T>>,
) -> Result<T, HandshakeError> {
    match tokio::time::timeout(limit, io).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(HandshakeError::Timeout),
    }
}
