//! Locator resolution engine
//!
//! Given a target identity and a record name, the resolver selects a
//! relay set (bootstrap plus optional gossip widening), queries for the
//! author's locator events under a deadline, picks the latest valid
//! instance with a deterministic tie-break, opens its content, applies
//! the freshness window, and caches the result.
//!
//! Relay-supplied data is untrusted: events failing signature
//! verification or claiming the wrong author are silently dropped
//! before selection.

use crate::cache::{ResolverCache, LATEST_IDENTIFIER};
use crate::config::{ResolveOptions, ResolverConfig};
use crate::unix_now;
use lodestone_core::error::{Error, Result};
use lodestone_core::event::{self, open_locator, sort_newest_first, LOCATOR_KIND, RELAY_LIST_KIND};
use lodestone_core::keys::normalize_public_key;
use lodestone_core::{payload, Payload, Signer};
use lodestone_relay::{Filter, MemoryPool, RelayPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cap on locator events fetched per resolve; the `d` match happens
/// client-side so one wire query serves both resolve flavours
const QUERY_LIMIT: usize = 50;

/// Resolves locator records for peer identities
///
/// Cache entries are keyed by `(author, identifier)` and carry opened
/// payloads, so one resolver instance serves one local identity; give
/// each caller identity its own resolver (they can share a pool).
pub struct Resolver {
    pool: Arc<dyn RelayPool>,
    owns_pool: bool,
    config: ResolverConfig,
    cache: ResolverCache,
}

impl Resolver {
    /// Resolver with an internally owned pool
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            pool: Arc::new(MemoryPool::new()),
            owns_pool: true,
            config,
            cache: ResolverCache::new(),
        }
    }

    /// Resolver over an externally owned pool; [`Resolver::close`] will
    /// not touch it
    pub fn with_pool(config: ResolverConfig, pool: Arc<dyn RelayPool>) -> Self {
        Self {
            pool,
            owns_pool: false,
            config,
            cache: ResolverCache::new(),
        }
    }

    /// Resolver that takes ownership of `pool` and closes it on
    /// [`Resolver::close`]
    pub fn with_owned_pool(config: ResolverConfig, pool: Arc<dyn RelayPool>) -> Self {
        Self {
            pool,
            owns_pool: true,
            config,
            cache: ResolverCache::new(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn pool(&self) -> Arc<dyn RelayPool> {
        self.pool.clone()
    }

    /// Resolve the record named `identifier` published by `target`.
    ///
    /// `target` is a 64-char hex key or bech32 `npub1...`; `signer` is
    /// required to open self, targeted, or wrapped content. Returns
    /// `Ok(None)` when no usable record exists. Raises
    /// [`Error::Argument`] on a malformed target, [`Error::Timeout`] on
    /// deadline expiry, [`Error::Relay`] when every relay failed, and —
    /// in strict mode only — [`Error::Decryption`].
    pub async fn resolve(
        &self,
        target: &str,
        signer: Option<&dyn Signer>,
        identifier: &str,
        options: &ResolveOptions,
    ) -> Result<Option<Payload>> {
        self.resolve_inner(target, signer, Some(identifier), options)
            .await
    }

    /// Resolve the freshest locator record from `target`, ignoring the
    /// record name
    pub async fn resolve_latest(
        &self,
        target: &str,
        signer: Option<&dyn Signer>,
        options: &ResolveOptions,
    ) -> Result<Option<Payload>> {
        self.resolve_inner(target, signer, None, options).await
    }

    async fn resolve_inner(
        &self,
        target: &str,
        signer: Option<&dyn Signer>,
        identifier: Option<&str>,
        options: &ResolveOptions,
    ) -> Result<Option<Payload>> {
        let started = Instant::now();
        let pubkey = normalize_public_key(target)?;
        let cache_identifier = identifier.unwrap_or(LATEST_IDENTIFIER);

        if let Some(cached) = self.cache.get(&pubkey, cache_identifier, unix_now()) {
            debug!(pubkey = %pubkey, identifier = cache_identifier, "cache hit");
            return Ok(Some(self.transform(cached)));
        }

        let mut relays = self.config.bootstrap_relays.clone();
        if options.gossip {
            match self.discover_relays(&pubkey, self.remaining(started)).await {
                Ok(extra) => {
                    for url in extra {
                        if !relays.contains(&url) {
                            relays.push(url);
                        }
                    }
                }
                // discovery is best-effort; resolution continues on bootstrap
                Err(e) => warn!(pubkey = %pubkey, error = %e, "relay discovery failed"),
            }
        }

        let filter = Filter::new()
            .author(pubkey.clone())
            .kind(LOCATOR_KIND)
            .limit(QUERY_LIMIT);
        let query = self.pool.query(&relays, &filter, self.remaining(started));
        let mut events = match tokio::time::timeout(self.remaining(started), query).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout("resolve deadline elapsed".into())),
        };

        events.retain(|e| {
            if e.pubkey != pubkey {
                debug!(event = %e.id, "dropping event with mismatched author");
                return false;
            }
            if e.verify().is_err() {
                debug!(event = %e.id, "dropping event with invalid signature");
                return false;
            }
            true
        });
        sort_newest_first(&mut events);
        let Some(event) = events.into_iter().next() else {
            return Ok(None);
        };

        if let Some(wanted) = identifier {
            if event.identifier() != Some(wanted) {
                return Ok(None);
            }
        }

        let bytes = match open_locator(&event, signer).await {
            Ok(Some(bytes)) => bytes,
            // wrapped record that does not include us
            Ok(None) => return Ok(None),
            Err(e @ Error::Decryption(_)) => {
                if options.strict {
                    return Err(e);
                }
                warn!(pubkey = %pubkey, error = %e, "locator content did not open");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let payload = match payload::decode(&bytes) {
            Ok(p) => p,
            // a record the network garbled, not bad caller input: same
            // class as a decryption failure
            Err(e) => {
                if options.strict {
                    return Err(Error::Decryption(format!("malformed locator payload: {e}")));
                }
                warn!(pubkey = %pubkey, error = %e, "locator payload did not parse");
                return Ok(None);
            }
        };

        let explicit = event.expiration().unwrap_or(u64::MAX);
        let expires_at = explicit.min(payload.expires_at());
        if unix_now() > expires_at {
            if options.strict {
                return Ok(None);
            }
            warn!(pubkey = %pubkey, expires_at, "returning expired locator; not caching");
            return Ok(Some(self.transform(payload)));
        }

        self.cache
            .insert(&pubkey, cache_identifier, payload.clone(), expires_at);
        Ok(Some(self.transform(payload)))
    }

    /// Read the target's advertised relay list from the bootstrap set.
    ///
    /// Only a verified relay-list event from the target itself widens
    /// the query set; anything else yields no additions.
    async fn discover_relays(&self, pubkey: &str, deadline: Duration) -> Result<Vec<String>> {
        let filter = Filter::new()
            .author(pubkey.to_string())
            .kind(RELAY_LIST_KIND)
            .limit(1);
        let event = self
            .pool
            .get(&self.config.bootstrap_relays, &filter, deadline)
            .await?;

        let Some(event) = event else {
            return Ok(Vec::new());
        };
        if event.pubkey != pubkey || event.verify().is_err() {
            debug!(pubkey = %pubkey, "ignoring unverifiable relay list");
            return Ok(Vec::new());
        }

        let mut urls = Vec::new();
        for url in event.tag_values(event::TAG_RELAY) {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        debug!(pubkey = %pubkey, count = urls.len(), "gossip discovered relays");
        Ok(urls)
    }

    fn remaining(&self, started: Instant) -> Duration {
        self.config.timeout.saturating_sub(started.elapsed())
    }

    fn transform(&self, mut payload: Payload) -> Payload {
        if let Some(transformer) = &self.config.url_transformer {
            payload.endpoints = payload
                .endpoints
                .into_iter()
                .map(|e| transformer(e))
                .collect();
        }
        payload
    }

    /// Drop cached entries
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Close the pool if this resolver owns it
    pub async fn close(&self) {
        if self.owns_pool {
            self.pool.close().await;
        }
    }
}
