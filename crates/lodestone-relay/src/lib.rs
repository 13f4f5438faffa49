//! Relay protocol layer for Lodestone
//!
//! This crate provides:
//! - The relay wire frame grammar and subscription filters
//! - The relay pool abstraction consumed by resolver and publisher
//! - A hermetic in-memory relay/pool for tests and embeddings

pub mod memory;
pub mod message;
pub mod pool;

pub use memory::{MemoryPool, MemoryRelay};
pub use message::{ClientMessage, Filter, RelayMessage};
pub use pool::{PublishOutcome, RelayPool};
