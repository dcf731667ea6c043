//! PIN key derivation, sealing and identity ids.
//!
//! The PIN is stretched with Argon2id under a per-identity random salt and the
//! resulting key seals the seed with XChaCha20-Poly1305. The identity id is
//! bound into the AEAD associated data so an envelope cannot be replayed under
//! another id.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{
    error::{StorageError, StorageResult},
    IdentityId,
};
use crate::{config::KdfParams, secret::Pin};

const NONCE_SIZE: usize = 24;
const SEAL_LABEL: &[u8] = b"seedkit:sealed-seed";
const IDENTITY_ID_SALT: &[u8] = b"seedkit:identity-id:salt";
const IDENTITY_ID_INFO: &[u8] = b"seedkit:identity-id";

/// Encryption key derived from a PIN.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct PinKey([u8; 32]);

impl std::fmt::Debug for PinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinKey").field("key", &"[REDACTED]").finish()
    }
}

pub(crate) fn random_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Stretches `pin` into a 256-bit key with Argon2id.
pub(crate) fn derive_pin_key(
    pin: &Pin,
    salt: &[u8],
    kdf: &KdfParams,
) -> StorageResult<PinKey> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|err| StorageError::KeyDerivation(err.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = PinKey([0u8; 32]);
    argon2
        .hash_password_into(pin.expose_secret().as_bytes(), salt, &mut key.0)
        .map_err(|err| StorageError::KeyDerivation(err.to_string()))?;
    Ok(key)
}

fn associated_data(id: &IdentityId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(SEAL_LABEL.len() + id.as_str().len());
    aad.extend_from_slice(SEAL_LABEL);
    aad.extend_from_slice(id.as_str().as_bytes());
    aad
}

/// Seals `plaintext` for `id`. Output is `nonce || ciphertext || tag`.
pub(crate) fn seal(
    key: &PinKey,
    id: &IdentityId,
    plaintext: &[u8],
) -> StorageResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &associated_data(id),
            },
        )
        .map_err(|err| StorageError::Crypto(err.to_string()))?;
    let mut out = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Opens a value produced by [`seal`].
///
/// Authentication failures are reported as [`StorageError::InvalidPin`]; with
/// an intact envelope a wrong PIN is the only way to get one.
pub(crate) fn open(
    key: &PinKey,
    id: &IdentityId,
    sealed: &[u8],
) -> StorageResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_SIZE {
        return Err(StorageError::Crypto("sealed seed too short".to_string()));
    }
    let (nonce_bytes, payload) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    cipher
        .decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: payload,
                aad: &associated_data(id),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| StorageError::InvalidPin)
}

/// Deterministic identity id for a seed, so the same seed maps to one record.
pub(crate) fn identity_id(seed: &[u8]) -> StorageResult<IdentityId> {
    let hkdf = Hkdf::<Sha256>::new(Some(IDENTITY_ID_SALT), seed);
    let mut okm = [0u8; 16];
    hkdf.expand(IDENTITY_ID_INFO, &mut okm)
        .map_err(|err| StorageError::Crypto(err.to_string()))?;
    Ok(IdentityId::from_bytes(okm))
}
