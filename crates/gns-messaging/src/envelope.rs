//! The signed, encrypted wire unit exchanged between identities.
//!
//! JSON shape:
//! `{version, from_pk, to_pk, ephemeral_pk, ciphertext, nonce, signature,
//! message_id, timestamp}` with keys and signatures in hex, the ciphertext in
//! base64 and the timestamp in RFC 3339 with millisecond precision.

use chrono::{DateTime, Utc};
use gns_core::{Ed25519PublicKey, Ed25519Signature, X25519PublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Current envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

/// ChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 12;

/// An end-to-end encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub from_pk: Ed25519PublicKey,
    pub to_pk: Ed25519PublicKey,
    /// Single-use X25519 key generated for this envelope only.
    pub ephemeral_pk: X25519PublicKey,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_nonce")]
    pub nonce: [u8; NONCE_LEN],
    pub signature: Ed25519Signature,
    pub message_id: Uuid,
    #[serde(with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Bytes covered by the sender's signature.
    pub fn signed_bytes(&self) -> Vec<u8> {
        signing_message(
            &self.ciphertext,
            &self.ephemeral_pk,
            &self.nonce,
            self.timestamp.timestamp_millis(),
        )
    }

    /// Check the signature against `from_pk`.
    pub fn verify_signature(&self) -> bool {
        self.from_pk.verify(&self.signed_bytes(), &self.signature)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// `ciphertext ‖ ephemeral_pk ‖ nonce ‖ timestamp_ms (i64 BE)`.
pub(crate) fn signing_message(
    ciphertext: &[u8],
    ephemeral_pk: &X25519PublicKey,
    nonce: &[u8; NONCE_LEN],
    timestamp_ms: i64,
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(ciphertext.len() + 32 + NONCE_LEN + 8);
    msg.extend_from_slice(ciphertext);
    msg.extend_from_slice(ephemeral_pk.as_bytes());
    msg.extend_from_slice(nonce);
    msg.extend_from_slice(&timestamp_ms.to_be_bytes());
    msg
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(D::Error::custom)
    }
}

mod hex_nonce {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::NONCE_LEN;

    pub fn serialize<S: Serializer>(nonce: &[u8; NONCE_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(nonce))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; NONCE_LEN], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("nonce must be 12 bytes"))
    }
}

mod rfc3339_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}
