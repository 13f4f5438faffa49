//! Lodestone client library
//!
//! High-level resolution and publishing of identity-bound locator
//! records over a relay pool:
//!
//! - [`resolver`]: relay selection, gossip discovery, event selection,
//!   freshness, caching
//! - [`publisher`]: encrypt-sign-broadcast with partial-success
//!   semantics
//! - [`group`]: shared-identity convenience
//! - [`config`]: library configuration and per-call options

pub mod config;
pub mod group;
pub mod publisher;
pub mod resolver;

mod cache;

pub use config::{
    ResolveOptions, ResolverConfig, UrlTransformer, DEFAULT_BOOTSTRAP_RELAYS,
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_RESOLVE_TIMEOUT,
};
pub use group::GroupIdentity;
pub use publisher::{PublishOptions, Publisher};
pub use resolver::Resolver;

/// Current Unix time in seconds
pub(crate) fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
