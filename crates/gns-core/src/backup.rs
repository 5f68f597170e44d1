//! Passphrase-protected identity backups.
//!
//! The secret key is never serialized in the clear. An export derives a key
//! with Argon2id from the passphrase and a random salt, then seals the 32-byte
//! Ed25519 secret with ChaCha20-Poly1305, binding the public key as AAD.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{Ed25519PublicKey, IdentityKeypair};
use crate::error::{CoreError, Result};

pub const BACKUP_VERSION: u8 = 1;
pub const KDF_NAME: &str = "argon2id";

/// Argon2id memory cost in KiB (64 MiB).
pub const ARGON2_MEMORY_KIB: u32 = 65_536;
pub const ARGON2_ITERATIONS: u32 = 3;
pub const ARGON2_PARALLELISM: u32 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// An encrypted identity export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedIdentity {
    pub version: u8,
    pub public_key: Ed25519PublicKey,
    /// Base64 ChaCha20-Poly1305 ciphertext of the secret key, tag included.
    pub encrypted_key: String,
    /// Hex, 12 bytes.
    pub nonce: String,
    /// Hex, 16 bytes.
    pub salt: String,
    pub kdf: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub exported_at: DateTime<Utc>,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(32),
    )
    .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

impl ExportedIdentity {
    /// Seal `keypair` under `passphrase`.
    pub fn export(
        keypair: &IdentityKeypair,
        passphrase: &str,
        name: Option<String>,
        handle: Option<String>,
    ) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = derive_key(passphrase, &salt)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;

        let public_key = keypair.public_key();
        let secret = keypair.secret_bytes();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &secret[..],
                    aad: public_key.as_bytes(),
                },
            )
            .map_err(|e| CoreError::Encoding(e.to_string()))?;

        Ok(Self {
            version: BACKUP_VERSION,
            public_key,
            encrypted_key: BASE64.encode(ciphertext),
            nonce: hex::encode(nonce),
            salt: hex::encode(salt),
            kdf: KDF_NAME.to_string(),
            name,
            handle,
            exported_at: Utc::now(),
        })
    }

    /// Recover the keypair. Fails closed on a wrong passphrase or a
    /// document whose key does not match its declared public key.
    pub fn import(&self, passphrase: &str) -> Result<IdentityKeypair> {
        if self.version != BACKUP_VERSION {
            return Err(CoreError::UnsupportedBackupVersion(self.version));
        }
        if self.kdf != KDF_NAME {
            return Err(CoreError::KeyDerivation(format!(
                "unsupported kdf: {}",
                self.kdf
            )));
        }

        let salt = hex::decode(&self.salt).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
        let nonce = hex::decode(&self.nonce).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(CoreError::InvalidKeyLength {
                expected: NONCE_LEN,
                got: nonce.len(),
            });
        }
        let ciphertext = BASE64
            .decode(&self.encrypted_key)
            .map_err(|e| CoreError::Encoding(e.to_string()))?;

        let key = derive_key(passphrase, &salt)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;

        let secret = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &ciphertext,
                        aad: self.public_key.as_bytes(),
                    },
                )
                .map_err(|_| CoreError::BackupDecryption)?,
        );

        let keypair =
            IdentityKeypair::from_secret_bytes(&secret).map_err(|_| CoreError::BackupDecryption)?;
        if !keypair.public_key().ct_eq(&self.public_key) {
            return Err(CoreError::BackupDecryption);
        }
        Ok(keypair)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Encoding(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Encoding(e.to_string()))
    }
}
