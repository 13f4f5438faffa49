//! Shared-identity convenience helpers
//!
//! A group identity is an ordinary keypair that several members hold a
//! copy of: one of them publishes locator records under it (typically
//! self-sealed), and every holder can resolve and open them. There is
//! no special wire behaviour; this is a thin façade over the resolver.

use crate::config::ResolveOptions;
use crate::resolver::Resolver;
use lodestone_core::error::Result;
use lodestone_core::{Keys, Payload};

/// An identity intended to be shared among group members
#[derive(Clone, Debug)]
pub struct GroupIdentity {
    keys: Keys,
}

impl GroupIdentity {
    /// Mint a fresh identity to hand out to members
    pub fn generate() -> Self {
        Self {
            keys: Keys::generate(),
        }
    }

    /// Reconstruct the shared identity from its secret (hex or nsec)
    pub fn from_secret(input: &str) -> Result<Self> {
        Ok(Self {
            keys: Keys::parse(input)?,
        })
    }

    /// The shared keypair (sign and decrypt capability)
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    pub fn public_key_hex(&self) -> String {
        self.keys.public_key_hex()
    }

    pub fn npub(&self) -> Result<String> {
        self.keys.npub()
    }

    /// Resolve the group's own record named `identifier`
    pub async fn resolve(
        &self,
        resolver: &Resolver,
        identifier: &str,
        options: &ResolveOptions,
    ) -> Result<Option<Payload>> {
        resolver
            .resolve(
                &self.public_key_hex(),
                Some(&self.keys),
                identifier,
                options,
            )
            .await
    }

    /// Resolve the group's freshest record regardless of name
    pub async fn resolve_latest(
        &self,
        resolver: &Resolver,
        options: &ResolveOptions,
    ) -> Result<Option<Payload>> {
        resolver
            .resolve_latest(&self.public_key_hex(), Some(&self.keys), options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::publisher::{PublishOptions, Publisher};
    use crate::unix_now;
    use lodestone_core::Endpoint;
    use lodestone_relay::MemoryPool;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_any_member_resolves_group_record() {
        let pool = Arc::new(MemoryPool::new());
        let relays = vec!["wss://a.example".to_string()];

        let group = GroupIdentity::generate();
        // a second member reconstructs the identity from the shared secret
        let member = GroupIdentity::from_secret(&group.keys().nsec().unwrap()).unwrap();

        let payload = Payload::new(
            600,
            unix_now(),
            vec![Endpoint::new("tcp", "203.0.113.7:9735").with_family("ipv4")],
        );
        Publisher::with_pool(pool.clone())
            .publish(&relays, group.keys(), &payload, &PublishOptions::default())
            .await
            .unwrap();

        let config = ResolverConfig::default()
            .with_bootstrap_relays(relays)
            .with_timeout(Duration::from_secs(2));
        let resolver = Resolver::with_pool(config, pool);

        let resolved = member
            .resolve(&resolver, "addr", &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.endpoints, payload.endpoints);
    }

    #[tokio::test]
    async fn test_generate_is_unique() {
        let a = GroupIdentity::generate();
        let b = GroupIdentity::generate();
        assert_ne!(a.public_key_hex(), b.public_key_hex());
    }

    #[tokio::test]
    async fn test_from_secret_rejects_garbage() {
        assert!(GroupIdentity::from_secret("not a key").is_err());
    }
}
