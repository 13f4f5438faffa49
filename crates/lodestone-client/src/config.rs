//! Resolver and publisher configuration

use lodestone_core::Endpoint;
use std::sync::Arc;
use std::time::Duration;

/// Relays consulted when the caller configures none
pub const DEFAULT_BOOTSTRAP_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
    "wss://nos.lol",
];

/// Default per-call deadline for resolution
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default per-call deadline for publishing
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Pure endpoint rewrite applied to every endpoint of a returned
/// payload, e.g. mapping `.onion` addresses to SOCKS URLs
pub type UrlTransformer = Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync>;

/// Resolver construction options
#[derive(Clone)]
pub struct ResolverConfig {
    /// Relays queried before any gossip widening
    pub bootstrap_relays: Vec<String>,
    /// Deadline for one `resolve` call, measured from entry
    pub timeout: Duration,
    /// Default for [`ResolveOptions::strict`]
    pub strict: bool,
    /// Default for [`ResolveOptions::gossip`]
    pub gossip: bool,
    /// Applied to returned payloads after the freshness check
    pub url_transformer: Option<UrlTransformer>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bootstrap_relays: DEFAULT_BOOTSTRAP_RELAYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout: DEFAULT_RESOLVE_TIMEOUT,
            strict: false,
            gossip: false,
            url_transformer: None,
        }
    }
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("bootstrap_relays", &self.bootstrap_relays)
            .field("timeout", &self.timeout)
            .field("strict", &self.strict)
            .field("gossip", &self.gossip)
            .field("url_transformer", &self.url_transformer.is_some())
            .finish()
    }
}

impl ResolverConfig {
    pub fn with_bootstrap_relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap_relays = relays.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_url_transformer(mut self, transformer: UrlTransformer) -> Self {
        self.url_transformer = Some(transformer);
        self
    }

    /// Per-call options seeded from this configuration's defaults
    pub fn options(&self) -> ResolveOptions {
        ResolveOptions {
            strict: self.strict,
            gossip: self.gossip,
        }
    }
}

/// Per-call resolution options
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions {
    /// Treat expired or undecryptable records as failures instead of
    /// best-effort results
    pub strict: bool,
    /// Widen the relay set with the target's advertised relay list
    pub gossip: bool,
}

impl ResolveOptions {
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn gossip(mut self) -> Self {
        self.gossip = true;
        self
    }
}
