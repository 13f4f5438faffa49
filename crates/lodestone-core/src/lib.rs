//! Lodestone Core Library
//!
//! Core types, codecs, and cryptographic primitives for Lodestone:
//! identity-bound, encrypted network locator records resolved over a
//! relay-based event bus.
//!
//! # Modules
//!
//! - [`keys`]: identities, input normalization, the `Signer` capability
//! - [`payload`]: the locator document codec
//! - [`event`]: locator event build / verify / open (kind 30058)
//! - [`cipher`]: the ECDH-keyed authenticated channel
//! - [`select`]: deterministic endpoint ordering
//! - [`error`]: the error taxonomy shared across the workspace

pub mod cipher;
pub mod error;
pub mod event;
pub mod keys;
pub mod payload;
pub mod select;

#[cfg(test)]
mod test_vectors;

pub use cipher::ConversationKey;
pub use error::{Error, Result};
pub use event::{
    build_locator, open_locator, sort_newest_first, BuildOptions, EncryptMode, Event,
    UnsignedEvent, WrappedContent, DEFAULT_IDENTIFIER, LOCATOR_KIND, RELAY_LIST_KIND,
};
pub use keys::{normalize_public_key, Keys, Signer};
pub use payload::{Endpoint, Payload, DEFAULT_PRIORITY, PAYLOAD_VERSION};
pub use select::{family_rank, select_endpoints};
