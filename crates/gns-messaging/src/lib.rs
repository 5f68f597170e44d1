//! # GNS Messaging
//!
//! End-to-end encrypted envelopes between GNS identities.
//!
//! Every envelope uses a fresh ephemeral X25519 key, so compromising a
//! long-term key does not expose past messages. Envelopes are signed by the
//! sender's Ed25519 identity key and the signature is checked before any
//! decryption is attempted.
//!
//! ## Key Types
//!
//! - [`Envelope`]: the signed wire unit
//! - [`MessagePayload`]: the typed body inside the ciphertext
//! - [`PeerResolver`]: handle/key lookup boundary

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod resolver;

pub use crypto::{decrypt, decrypt_payload, encrypt, encrypt_at, encrypt_payload};
pub use envelope::{Envelope, ENVELOPE_VERSION};
pub use error::{MessagingError, Result};
pub use payload::{MessagePayload, MessageType};
pub use resolver::{MemoryResolver, PeerKeys, PeerResolver};
