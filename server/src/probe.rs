//! Client side of the login handshake, for the probe binary and tests.

use crate::crypto::encrypt_block;
use crate::error::HandshakeError;
use rsa::RsaPublicKey;
use shared::protocol::{
    encode_credentials, CredentialBody, CredentialHeader, LoginKind, CHECKSUM_COUNT,
    DEFAULT_REVISION, HANDSHAKE_MAGIC, HANDSHAKE_PADDING, SERVER_KEY_SIZE,
};
use shared::InitResponseCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Credentials and client details to log in with.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub kind: LoginKind,
    pub username: String,
    pub password: String,
    pub revision: i16,
    pub signlink: i32,
    pub low_memory: bool,
}

impl LoginAttempt {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            kind: LoginKind::New,
            username: username.to_owned(),
            password: password.to_owned(),
            revision: DEFAULT_REVISION,
            signlink: rand::random(),
            low_memory: false,
        }
    }

    pub fn reconnect(mut self) -> Self {
        self.kind = LoginKind::Reconnect;
        self
    }
}

/// What the server answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginReply {
    pub code: InitResponseCode,
    /// Only present once the server got as far as asking for credentials.
    pub server_key: Option<[u8; SERVER_KEY_SIZE]>,
    /// Only sent with a fresh login.
    pub rights: Option<u8>,
}

impl LoginReply {
    fn rejected(code: InitResponseCode) -> Self {
        Self {
            code,
            server_key: None,
            rights: None,
        }
    }
}

async fn read_code<S: AsyncRead + Unpin>(stream: &mut S) -> Result<InitResponseCode, HandshakeError> {
    let byte = stream.read_u8().await?;
    InitResponseCode::try_from(byte).map_err(|byte| {
        HandshakeError::protocol(
            InitResponseCode::GeneralFailure,
            format!("unknown response code {}", byte),
        )
    })
}

/// Runs one login over `stream`, encrypting credentials for `public`.
pub async fn login<S>(
    stream: &mut S,
    public: &RsaPublicKey,
    attempt: &LoginAttempt,
) -> Result<LoginReply, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[HANDSHAKE_MAGIC, 0]).await?;
    stream.flush().await?;

    let mut padding = [0u8; HANDSHAKE_PADDING];
    stream.read_exact(&mut padding).await?;
    let code = read_code(stream).await?;
    if code != InitResponseCode::ContinueToCredentials {
        return Ok(LoginReply::rejected(code));
    }
    let mut server_key = [0u8; SERVER_KEY_SIZE];
    stream.read_exact(&mut server_key).await?;

    let header = CredentialHeader {
        kind: attempt.kind,
        revision: attempt.revision,
        low_memory: attempt.low_memory,
        checksums: [0; CHECKSUM_COUNT],
    };
    let body = CredentialBody {
        session_keys: rand::random(),
        signlink_uid: attempt.signlink,
        username: attempt.username.clone(),
        password: attempt.password.clone(),
    };
    let plain = encode_credentials(&header, &body)?;
    let block = encrypt_block(public, &plain)?;
    stream.write_all(&block).await?;
    stream.flush().await?;

    let code = read_code(stream).await?;
    let rights = if code == InitResponseCode::LoginDone {
        let _flagged = stream.read_u8().await?;
        Some(stream.read_u8().await?)
    } else {
        None
    };
    Ok(LoginReply {
        code,
        server_key: Some(server_key),
        rights,
    })
}
