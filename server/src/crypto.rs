//! Login key handling: RSA-OAEP (SHA-1) decryption of the credential block and
//! random session key generation.

use crate::error::ServerError;
use log::warn;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use shared::protocol::SERVER_KEY_SIZE;
use std::path::{Path, PathBuf};

/// Key size used when the server has to mint its own login key.
pub const GENERATED_KEY_BITS: usize = 2048;

/// The server's private login key.
#[derive(Clone)]
pub struct LoginKey {
    key: RsaPrivateKey,
}

impl LoginKey {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    pub fn generate(bits: usize) -> Result<Self, rsa::Error> {
        Ok(Self::new(RsaPrivateKey::new(&mut OsRng, bits)?))
    }

    /// Parses a PKCS#1 or PKCS#8 PEM private key.
    pub fn from_pem(pem: &str) -> Result<Self, ServerError> {
        RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map(Self::new)
            .map_err(|_| ServerError::KeyFormat)
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let pem = std::fs::read_to_string(path).map_err(|source| ServerError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Loads the key at `path`, or generates a fresh one and writes it there
    /// together with its public half at `<path>.pub`.
    pub fn load_or_generate(path: &Path) -> Result<Self, ServerError> {
        if path.exists() {
            return Self::load(path);
        }
        warn!(
            "No login key at {}, generating a {}-bit key",
            path.display(),
            GENERATED_KEY_BITS
        );
        let key = Self::generate(GENERATED_KEY_BITS).map_err(|_| ServerError::KeyFormat)?;
        let private_pem = key
            .key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|_| ServerError::KeyFormat)?;
        let public_pem = key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| ServerError::KeyFormat)?;
        write_key_file(path, private_pem.as_bytes())?;
        write_key_file(&public_key_path(path), public_pem.as_bytes())?;
        Ok(key)
    }

    /// Size in bytes of one encrypted credential block.
    pub fn block_size(&self) -> usize {
        self.key.size()
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    pub fn decrypt(&self, block: &[u8]) -> Result<Vec<u8>, rsa::Error> {
        self.key.decrypt(Oaep::new::<Sha1>(), block)
    }
}

/// Where the public half of the key at `path` is kept.
pub fn public_key_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, ServerError> {
    let pem = std::fs::read_to_string(path).map_err(|source| ServerError::KeyFile {
        path: path.display().to_string(),
        source,
    })?;
    RsaPublicKey::from_public_key_pem(&pem).map_err(|_| ServerError::KeyFormat)
}

fn write_key_file(path: &Path, contents: &[u8]) -> Result<(), ServerError> {
    std::fs::write(path, contents).map_err(|source| ServerError::KeyFile {
        path: path.display().to_string(),
        source,
    })
}

/// Encrypts a plaintext credential block the way a client does.
pub fn encrypt_block(public: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, rsa::Error> {
    public.encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext)
}

/// Fresh random key sent to the client to seed the packet stream cipher.
pub fn generate_session_key() -> [u8; SERVER_KEY_SIZE] {
    let mut key = [0u8; SERVER_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}
