//! Envelope encryption with per-message forward secrecy.
//!
//! Each envelope gets a fresh X25519 ephemeral key. The message key is
//! `HKDF-SHA256(DH(ephemeral, recipient), salt = "gns-message-key",
//! info = from_pk ‖ to_pk ‖ ephemeral_pk)` and the payload is sealed with
//! ChaCha20-Poly1305. The ephemeral secret is consumed by the key agreement
//! and never leaves this module.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use chrono::{DateTime, Utc};
use gns_core::{Ed25519PublicKey, IdentityKeypair, X25519PublicKey};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::envelope::{signing_message, Envelope, ENVELOPE_VERSION, NONCE_LEN};
use crate::error::{MessagingError, Result};
use crate::payload::MessagePayload;

/// HKDF salt for message keys.
pub const MESSAGE_KEY_SALT: &[u8] = b"gns-message-key";

/// Derive the symmetric key for one envelope.
fn message_key(
    shared: &[u8; 32],
    from_pk: &Ed25519PublicKey,
    to_pk: &Ed25519PublicKey,
    ephemeral_pk: &X25519PublicKey,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut info = [0u8; 96];
    info[..32].copy_from_slice(from_pk.as_bytes());
    info[32..64].copy_from_slice(to_pk.as_bytes());
    info[64..].copy_from_slice(ephemeral_pk.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(MESSAGE_KEY_SALT), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(&info, &mut key[..])
        .map_err(|e| MessagingError::Encryption(e.to_string()))?;
    Ok(key)
}

/// Encrypt bytes for a recipient, timestamped now.
pub fn encrypt(
    sender: &IdentityKeypair,
    to_pk: &Ed25519PublicKey,
    recipient_encryption_key: &X25519PublicKey,
    plaintext: &[u8],
) -> Result<Envelope> {
    encrypt_at(sender, to_pk, recipient_encryption_key, plaintext, Utc::now())
}

/// Encrypt bytes for a recipient with an explicit timestamp.
///
/// The timestamp is truncated to milliseconds, which is the precision that is
/// signed and transmitted.
pub fn encrypt_at(
    sender: &IdentityKeypair,
    to_pk: &Ed25519PublicKey,
    recipient_encryption_key: &X25519PublicKey,
    plaintext: &[u8],
    timestamp: DateTime<Utc>,
) -> Result<Envelope> {
    let timestamp_ms = timestamp.timestamp_millis();
    let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| MessagingError::Encoding("timestamp out of range".into()))?;

    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_pk = X25519PublicKey::from(PublicKey::from(&ephemeral));
    let shared = ephemeral.diffie_hellman(&recipient_encryption_key.to_dalek());
    if !shared.was_contributory() {
        return Err(MessagingError::NonContributory);
    }

    let from_pk = sender.public_key();
    let key = message_key(shared.as_bytes(), &from_pk, to_pk, &ephemeral_pk)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|e| MessagingError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| MessagingError::Encryption(e.to_string()))?;

    let signature = sender.sign(&signing_message(
        &ciphertext,
        &ephemeral_pk,
        &nonce,
        timestamp_ms,
    ));

    Ok(Envelope {
        version: ENVELOPE_VERSION,
        from_pk,
        to_pk: *to_pk,
        ephemeral_pk,
        ciphertext,
        nonce,
        signature,
        message_id: Uuid::new_v4(),
        timestamp,
    })
}

/// Verify and decrypt an envelope addressed to `recipient`.
///
/// The signature is checked before any decryption is attempted.
pub fn decrypt(recipient: &IdentityKeypair, envelope: &Envelope) -> Result<Vec<u8>> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(MessagingError::UnsupportedVersion(envelope.version));
    }
    if !envelope.to_pk.ct_eq(&recipient.public_key()) {
        return Err(MessagingError::WrongRecipient);
    }
    if !envelope.verify_signature() {
        tracing::warn!(
            from = %envelope.from_pk.short(),
            message_id = %envelope.message_id,
            "rejected envelope with invalid signature"
        );
        return Err(MessagingError::InvalidSignature);
    }

    let shared = recipient
        .encryption()
        .diffie_hellman(&envelope.ephemeral_pk)
        .ok_or(MessagingError::NonContributory)?;
    let key = message_key(
        &shared,
        &envelope.from_pk,
        &envelope.to_pk,
        &envelope.ephemeral_pk,
    )?;

    let cipher =
        ChaCha20Poly1305::new_from_slice(&key[..]).map_err(|_| MessagingError::Decryption)?;
    cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| MessagingError::Decryption)
}

/// Encrypt a typed payload.
pub fn encrypt_payload(
    sender: &IdentityKeypair,
    to_pk: &Ed25519PublicKey,
    recipient_encryption_key: &X25519PublicKey,
    payload: &MessagePayload,
) -> Result<Envelope> {
    let bytes = Zeroizing::new(payload.to_bytes()?);
    encrypt(sender, to_pk, recipient_encryption_key, &bytes)
}

/// Decrypt an envelope into a typed payload.
pub fn decrypt_payload(recipient: &IdentityKeypair, envelope: &Envelope) -> Result<MessagePayload> {
    let bytes = Zeroizing::new(decrypt(recipient, envelope)?);
    MessagePayload::from_bytes(&bytes)
}
