//! Login handshake constants, response codes and the credential block codec.

use crate::buffer::FramedBuffer;
use crate::error::{BufferError, BufferResult};
use thiserror::Error;

/// First byte a client sends when opening a connection.
pub const HANDSHAKE_MAGIC: u8 = 14;
/// Zero bytes preceding the response code of the first server reply.
pub const HANDSHAKE_PADDING: usize = 8;
/// Size of the random server session key.
pub const SERVER_KEY_SIZE: usize = 8;
/// Credential block magic for a fresh login.
pub const NEW_LOGIN_MAGIC: u8 = 16;
/// Credential block magic for a reconnect.
pub const RECONNECT_MAGIC: u8 = 18;
/// Magic byte separating the client checksums from the session keys.
pub const LOGIN_BLOCK_MAGIC: u8 = 10;
pub const CHECKSUM_COUNT: usize = 9;
pub const SESSION_KEY_COUNT: usize = 4;
pub const MAX_USERNAME_CHARS: usize = 12;
pub const MAX_PASSWORD_CHARS: usize = 20;
pub const DEFAULT_REVISION: i16 = 317;

/// Response codes sent to the client during login. Values are wire-significant.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitResponseCode {
    ContinueToCredentials = 0,
    Wait = 1,
    LoginDone = 2,
    InvalidCredentials = 3,
    DisabledAccount = 4,
    AccountAlreadyLoggedIn = 5,
    MustUpdate = 6,
    WorldIsFull = 7,
    LoginServerOffline = 8,
    LoginRatelimitByAddress = 9,
    BadSessionId = 10,
    LoginServerRejected = 11,
    IsNotAMember = 12,
    GeneralFailure = 13,
    UpdateInProgress = 14,
    ReconnectDone = 15,
    LoginRatelimitBySocket = 16,
    InMembersArea = 17,
    InvalidLoginServer = 20,
    TransferringAccount = 21,
}

impl InitResponseCode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this code ends the handshake with a logged-in session.
    pub fn is_success(self) -> bool {
        matches!(self, Self::LoginDone | Self::ReconnectDone)
    }
}

impl TryFrom<u8> for InitResponseCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use InitResponseCode::*;
        Ok(match value {
            0 => ContinueToCredentials,
            1 => Wait,
            2 => LoginDone,
            3 => InvalidCredentials,
            4 => DisabledAccount,
            5 => AccountAlreadyLoggedIn,
            6 => MustUpdate,
            7 => WorldIsFull,
            8 => LoginServerOffline,
            9 => LoginRatelimitByAddress,
            10 => BadSessionId,
            11 => LoginServerRejected,
            12 => IsNotAMember,
            13 => GeneralFailure,
            14 => UpdateInProgress,
            15 => ReconnectDone,
            16 => LoginRatelimitBySocket,
            17 => InMembersArea,
            20 => InvalidLoginServer,
            21 => TransferringAccount,
            other => return Err(other),
        })
    }
}

/// Whether the client asks for a new session or to resume an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    New,
    Reconnect,
}

impl LoginKind {
    pub fn magic(self) -> u8 {
        match self {
            Self::New => NEW_LOGIN_MAGIC,
            Self::Reconnect => RECONNECT_MAGIC,
        }
    }

    pub fn from_magic(magic: u8) -> Option<Self> {
        match magic {
            NEW_LOGIN_MAGIC => Some(Self::New),
            RECONNECT_MAGIC => Some(Self::Reconnect),
            _ => None,
        }
    }
}

/// Failures while decoding the decrypted credential block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("invalid login block magic {0}")]
    ConnectMagic(u8),
    #[error("invalid login magic {0}")]
    LoginMagic(u8),
    #[error("empty username")]
    EmptyUsername,
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Leading section of the credential block, up to and including the checksums.
///
/// Decoded separately from [`CredentialBody`] so the revision can be checked
/// before anything else in the block is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHeader {
    pub kind: LoginKind,
    pub revision: i16,
    pub low_memory: bool,
    pub checksums: [i32; CHECKSUM_COUNT],
}

impl CredentialHeader {
    pub fn decode(buf: &mut FramedBuffer) -> Result<Self, CredentialError> {
        let magic = buf.read_u8()?;
        let kind = LoginKind::from_magic(magic).ok_or(CredentialError::ConnectMagic(magic))?;
        // block length and a constant 255, neither is used
        buf.skip(2)?;
        let revision = buf.read_i16()?;
        let low_memory = buf.read_u8()? == 1;
        let mut checksums = [0i32; CHECKSUM_COUNT];
        for checksum in checksums.iter_mut() {
            *checksum = buf.read_i32()?;
        }
        Ok(Self {
            kind,
            revision,
            low_memory,
            checksums,
        })
    }

    pub fn encode(&self, buf: &mut FramedBuffer, body_len: u8) -> BufferResult<()> {
        buf.write_u8(self.kind.magic())?;
        buf.write_u8(body_len)?;
        buf.write_u8(u8::MAX)?;
        buf.write_i16(self.revision)?;
        buf.write_u8(u8::from(self.low_memory))?;
        for checksum in self.checksums {
            buf.write_i32(checksum)?;
        }
        Ok(())
    }
}

/// Trailing section of the credential block: session keys and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBody {
    pub session_keys: [i32; SESSION_KEY_COUNT],
    pub signlink_uid: i32,
    pub username: String,
    pub password: String,
}

impl CredentialBody {
    /// Decodes the body. The username is normalised to lowercase.
    pub fn decode(buf: &mut FramedBuffer) -> Result<Self, CredentialError> {
        let magic = buf.read_u8()?;
        if magic != LOGIN_BLOCK_MAGIC {
            return Err(CredentialError::LoginMagic(magic));
        }
        let mut session_keys = [0i32; SESSION_KEY_COUNT];
        for key in session_keys.iter_mut() {
            *key = buf.read_i32()?;
        }
        let signlink_uid = buf.read_i32()?;
        let username = buf
            .read_length_prefixed_string(MAX_USERNAME_CHARS)?
            .to_lowercase();
        let password = buf.read_length_prefixed_string(MAX_PASSWORD_CHARS)?;
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }
        Ok(Self {
            session_keys,
            signlink_uid,
            username,
            password,
        })
    }

    pub fn encode(&self, buf: &mut FramedBuffer) -> BufferResult<()> {
        buf.write_u8(LOGIN_BLOCK_MAGIC)?;
        for key in self.session_keys {
            buf.write_i32(key)?;
        }
        buf.write_i32(self.signlink_uid)?;
        buf.write_string(&self.username)?;
        buf.write_string(&self.password)
    }
}

/// Encodes a full plaintext credential block, ready for encryption.
pub fn encode_credentials(
    header: &CredentialHeader,
    body: &CredentialBody,
) -> BufferResult<Vec<u8>> {
    let mut body_buf = FramedBuffer::with_capacity(64);
    body.encode(&mut body_buf)?;
    let body_len = body_buf.written().len().min(u8::MAX as usize) as u8;

    let mut buf = FramedBuffer::with_capacity(128);
    header.encode(&mut buf, body_len)?;
    buf.write_block(body_buf.written())?;
    Ok(buf.written().to_vec())
}

/// Wire code of a unit step, or `None` for a zero or non-unit delta.
///
/// Codes run NW, N, NE, W, E, SW, S, SE with north being +y.
pub fn direction_code(dx: i8, dy: i8) -> Option<u8> {
    match (dx, dy) {
        (-1, 1) => Some(0),
        (0, 1) => Some(1),
        (1, 1) => Some(2),
        (-1, 0) => Some(3),
        (1, 0) => Some(4),
        (-1, -1) => Some(5),
        (0, -1) => Some(6),
        (1, -1) => Some(7),
        _ => None,
    }
}

/// Inverse of [`direction_code`].
pub fn direction_delta(code: u8) -> Option<(i8, i8)> {
    match code {
        0 => Some((-1, 1)),
        1 => Some((0, 1)),
        2 => Some((1, 1)),
        3 => Some((-1, 0)),
        4 => Some((1, 0)),
        5 => Some((-1, -1)),
        6 => Some((0, -1)),
        7 => Some((1, -1)),
        _ => None,
    }
}

/// Packs an offset inside an 8x8 region into one byte: `x` in the high
/// nibble, `y` in the low nibble.
pub fn pack_position(x: i32, y: i32) -> u8 {
    (((x & 7) << 4) | (y & 7)) as u8
}

pub fn unpack_position(packed: u8) -> (i32, i32) {
    (i32::from((packed >> 4) & 7), i32::from(packed & 7))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(kind: LoginKind) -> CredentialHeader {
        CredentialHeader {
            kind,
            revision: DEFAULT_REVISION,
            low_memory: true,
            checksums: [7; CHECKSUM_COUNT],
        }
    }

    fn sample_body() -> CredentialBody {
        CredentialBody {
            session_keys: [1, 2, 3, 4],
            signlink_uid: 99,
            username: "Durial321".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn test_response_codes_keep_wire_values() {
        assert_eq!(InitResponseCode::ContinueToCredentials.as_byte(), 0);
        assert_eq!(InitResponseCode::MustUpdate.as_byte(), 6);
        assert_eq!(InitResponseCode::GeneralFailure.as_byte(), 13);
        assert_eq!(InitResponseCode::ReconnectDone.as_byte(), 15);
        assert_eq!(InitResponseCode::TransferringAccount.as_byte(), 21);
        assert_eq!(InitResponseCode::try_from(5u8), Ok(InitResponseCode::AccountAlreadyLoggedIn));
        assert_eq!(InitResponseCode::try_from(18u8), Err(18));
    }

    #[test]
    fn test_credential_block_decodes_in_two_stages() {
        let bytes = encode_credentials(&sample_header(LoginKind::Reconnect), &sample_body()).unwrap();
        let mut buf = FramedBuffer::from_bytes(&bytes);

        let header = CredentialHeader::decode(&mut buf).unwrap();
        assert_eq!(header.kind, LoginKind::Reconnect);
        assert_eq!(header.revision, DEFAULT_REVISION);
        assert!(header.low_memory);

        let body = CredentialBody::decode(&mut buf).unwrap();
        assert_eq!(body.username, "durial321");
        assert_eq!(body.signlink_uid, 99);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_unknown_connect_magic_is_rejected() {
        let mut bytes = encode_credentials(&sample_header(LoginKind::New), &sample_body()).unwrap();
        bytes[0] = 17;
        let mut buf = FramedBuffer::from_bytes(&bytes);
        assert_eq!(
            CredentialHeader::decode(&mut buf).unwrap_err(),
            CredentialError::ConnectMagic(17)
        );
    }

    #[test]
    fn test_wrong_login_magic_is_rejected_before_strings() {
        let header = sample_header(LoginKind::New);
        let mut bytes = encode_credentials(&header, &sample_body()).unwrap();
        let body_start = 1 + 2 + 2 + 1 + 4 * CHECKSUM_COUNT;
        bytes[body_start] = 11;
        let mut buf = FramedBuffer::from_bytes(&bytes);
        CredentialHeader::decode(&mut buf).unwrap();
        assert_eq!(
            CredentialBody::decode(&mut buf).unwrap_err(),
            CredentialError::LoginMagic(11)
        );
    }

    #[test]
    fn test_oversized_username_is_an_overflow() {
        let mut body = sample_body();
        body.username = "a".repeat(MAX_USERNAME_CHARS + 1);
        let bytes = encode_credentials(&sample_header(LoginKind::New), &body).unwrap();
        let mut buf = FramedBuffer::from_bytes(&bytes);
        CredentialHeader::decode(&mut buf).unwrap();
        assert!(matches!(
            CredentialBody::decode(&mut buf),
            Err(CredentialError::Buffer(BufferError::Overflow { .. }))
        ));
    }

    #[test]
    fn test_direction_codes_invert() {
        for code in 0..8u8 {
            let (dx, dy) = direction_delta(code).unwrap();
            assert_eq!(direction_code(dx, dy), Some(code));
        }
        assert_eq!(direction_code(0, 0), None);
        assert_eq!(direction_code(2, 0), None);
    }

    #[test]
    fn test_packed_position_keeps_region_offset() {
        let packed = pack_position(13, 6);
        assert_eq!(packed, (5 << 4) | 6);
        assert_eq!(unpack_position(packed), (5, 6));
    }
}
