//! # GNS Relay
//!
//! The hand-off boundary between the local core and the network.
//!
//! The core never speaks HTTP itself. It passes finished, signed
//! [`EpochHeader`](gns_core::EpochHeader)s and
//! [`Envelope`](gns_messaging::Envelope)s to a [`Relay`], which is expected to
//! deduplicate retries by `epoch_hash` and `message_id`.
//!
//! ## Key Types
//!
//! - [`Relay`]: async publication and delivery interface
//! - [`MemoryRelay`]: validating in-process implementation
//! - [`with_timeout`]: bounds any relay call

pub mod error;
pub mod memory;
pub mod relay;

pub use error::{RelayError, Result};
pub use memory::MemoryRelay;
pub use relay::{with_timeout, PublishOutcome, Relay};
