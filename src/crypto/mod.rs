//! Session Crypto
//!
//! Per-pairing Curve25519 keys, key agreement and authenticated encryption
//! of bridge messages. Messages are NaCl boxes, the construction TonConnect
//! wallets speak.
//!
//! ## Key Agreement
//!
//! ```text
//! dApp secret ──┐                    ┌── wallet secret
//!               ├── X25519 ── DH ────┤
//! wallet public ┘        │           └── dApp public
//!                        ▼
//!                 HSalsa20(DH, 0)
//!                        │
//!                        ▼
//!              XSalsa20-Poly1305 key
//! ```
//!
//! Ciphertexts on the wire are `nonce (24 bytes) || tag || ciphertext`.

use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Largest plaintext accepted by [`encrypt`] (1 MiB).
pub const MAX_MESSAGE_LEN: usize = 1 << 20;

/// Curve25519 keypair generated for one pairing attempt
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeyPair {
    /// Secret key (32 bytes)
    secret_key: [u8; KEY_LEN],

    /// Public key (32 bytes)
    #[zeroize(skip)]
    public_key: [u8; KEY_LEN],
}

impl SessionKeyPair {
    /// Rebuild a keypair from a stored secret key
    pub fn from_secret(secret_key: [u8; KEY_LEN]) -> Self {
        let public_key = derive_public_key(&secret_key);
        Self { secret_key, public_key }
    }

    pub fn public_key(&self) -> &[u8; KEY_LEN] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8; KEY_LEN] {
        &self.secret_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }
}

impl std::fmt::Debug for SessionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

/// Precomputed box key shared between the dApp and the wallet
#[derive(Clone)]
pub struct SharedSecret(Arc<SalsaBox>);

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Generate a fresh session keypair from the OS entropy source
pub fn generate_keypair() -> Result<SessionKeyPair, CryptoError> {
    let mut secret_key = [0u8; KEY_LEN];
    OsRng
        .try_fill_bytes(&mut secret_key)
        .map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(SessionKeyPair::from_secret(secret_key))
}

/// Derive public key from secret key using Curve25519
pub fn derive_public_key(secret_key: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let secret = StaticSecret::from(*secret_key);
    *PublicKey::from(&secret).as_bytes()
}

/// Raw X25519 output
fn diffie_hellman(
    local_secret: &[u8; KEY_LEN],
    remote_public: &[u8; KEY_LEN],
) -> Result<[u8; KEY_LEN], CryptoError> {
    let secret = StaticSecret::from(*local_secret);
    let shared = secret.diffie_hellman(&PublicKey::from(*remote_public));
    if !shared.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }
    Ok(*shared.as_bytes())
}

/// Derive the box key shared with `remote_public` (NaCl `crypto_box_beforenm`).
///
/// Deterministic: restoring a stored secret key reproduces the same key.
pub fn derive_shared_secret(
    local_secret: &[u8; KEY_LEN],
    remote_public: &[u8; KEY_LEN],
) -> Result<SharedSecret, CryptoError> {
    // Low-order points would give every peer the same key
    let mut dh = diffie_hellman(local_secret, remote_public)?;
    dh.zeroize();

    let secret = crypto_box::SecretKey::from(*local_secret);
    let public = crypto_box::PublicKey::from(*remote_public);
    Ok(SharedSecret(Arc::new(SalsaBox::new(&public, &secret))))
}

/// Box `plaintext` under `key` with a random nonce
pub fn encrypt(key: &SharedSecret, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if plaintext.len() > MAX_MESSAGE_LEN {
        return Err(CryptoError::MessageTooLarge { len: plaintext.len(), max: MAX_MESSAGE_LEN });
    }

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Entropy(e.to_string()))?;

    let sealed = key
        .0
        .encrypt(GenericArray::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::MessageTooLarge { len: plaintext.len(), max: MAX_MESSAGE_LEN })?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a `nonce || box` blob. Fails closed on any tampering.
pub fn decrypt(key: &SharedSecret, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if message.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Truncated);
    }
    let (nonce, sealed) = message.split_at(NONCE_LEN);

    key.0
        .decrypt(GenericArray::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decrypt)
}

/// Parse a 32-byte key from a byte slice
pub fn key_from_slice(bytes: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_LEN, got: bytes.len() })
}

/// Parse a 32-byte key from hex
pub fn key_from_hex(value: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = hex::decode(value).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        got: value.len() / 2,
    })?;
    key_from_slice(&bytes)
}
