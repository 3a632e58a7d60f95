//! Error types for the login gate, the entity system and server startup.

use crate::entity::{Capability, EntityId};
use shared::protocol::CredentialError;
use shared::{BufferError, InitResponseCode};
use thiserror::Error;

/// Why a handshake ended without a login.
///
/// Every variant maps to exactly one response code, which the gate sends
/// before closing the socket.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Malformed or out-of-date client input. Never retried.
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        code: InitResponseCode,
        reason: String,
    },

    /// Bad password, unknown or duplicate account. The client may retry.
    #[error("authentication failed: {reason}")]
    AuthenticationFailure {
        code: InitResponseCode,
        reason: String,
    },

    /// The server is not accepting logins right now.
    #[error("login refused: {0:?}")]
    Refused(InitResponseCode),

    #[error("credential block could not be decrypted: {0}")]
    Crypto(#[from] rsa::Error),

    #[error("handshake timed out")]
    Timeout,

    #[error("transient i/o failure: {0}")]
    TransientIo(#[from] std::io::Error),
}

impl HandshakeError {
    pub fn protocol(code: InitResponseCode, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            code,
            reason: reason.into(),
        }
    }

    pub fn authentication(code: InitResponseCode, reason: impl Into<String>) -> Self {
        Self::AuthenticationFailure {
            code,
            reason: reason.into(),
        }
    }

    /// The code written to the client for this failure.
    pub fn response_code(&self) -> InitResponseCode {
        match self {
            Self::ProtocolViolation { code, .. } | Self::AuthenticationFailure { code, .. } => *code,
            Self::Refused(code) => *code,
            Self::Crypto(_) | Self::Timeout | Self::TransientIo(_) => {
                InitResponseCode::GeneralFailure
            }
        }
    }
}

impl From<BufferError> for HandshakeError {
    fn from(err: BufferError) -> Self {
        Self::protocol(InitResponseCode::GeneralFailure, err.to_string())
    }
}

impl From<CredentialError> for HandshakeError {
    fn from(err: CredentialError) -> Self {
        Self::protocol(InitResponseCode::GeneralFailure, err.to_string())
    }
}

/// Failures creating or addressing entities. Component faults are
/// content-definition bugs, not runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("component {component} requires {missing}, which is not attached")]
    UnsatisfiedComponentRequirement {
        component: Capability,
        missing: Capability,
    },

    #[error("component {0} is already attached")]
    DuplicateComponent(Capability),

    #[error("no free entity ids")]
    NoFreeIds,

    #[error("entity {0} is gone")]
    Gone(EntityId),
}

/// Failures of the account store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("no account named {0}")]
    NotFound(String),

    #[error("account {username} has an unreadable profile: {reason}")]
    Corrupt { username: String, reason: String },
}

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to read login key {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },

    #[error("login key is not a valid RSA private key")]
    KeyFormat,
}

/// Why bytes read from a client socket were not queued for the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InboundError {
    #[error("the tick loop let go of the connection")]
    Closed,

    #[error("client has {pending} unprocessed bytes buffered")]
    Overflow { pending: usize },
}
