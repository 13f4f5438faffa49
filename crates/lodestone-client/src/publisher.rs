//! Locator publishing
//!
//! Builds a locator event in the mode implied by the options, signs it
//! through the supplied signer, and offers it to every target relay in
//! parallel under a deadline. Publishing is best-effort across relays:
//! one acceptance is success, and only a unanimous failure surfaces as
//! an error carrying every relay's reason.

use crate::config::DEFAULT_PUBLISH_TIMEOUT;
use crate::unix_now;
use lodestone_core::error::{Error, Result};
use lodestone_core::event::{build_locator, BuildOptions, EncryptMode, DEFAULT_IDENTIFIER};
use lodestone_core::keys::{normalize_public_key, parse_public_key};
use lodestone_core::{payload, Event, Payload, Signer};
use lodestone_relay::{MemoryPool, RelayPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Options for one publish call
#[derive(Clone, Debug)]
pub struct PublishOptions {
    /// Record name (`d` tag); defaults to `"addr"`
    pub identifier: String,
    /// Leave the payload in the clear instead of sealing it
    pub public: bool,
    /// Seal for this peer (hex or npub); ignored when `public` is set
    pub recipient: Option<String>,
    /// Add the `["private","true"]` tag
    pub private_locator: bool,
    /// Add an `["expiration", <epoch>]` tag
    pub expiration: Option<u64>,
    /// Override the event timestamp; defaults to the current clock
    pub created_at: Option<u64>,
    /// Per-call deadline
    pub timeout: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            identifier: DEFAULT_IDENTIFIER.to_string(),
            public: false,
            recipient: None,
            private_locator: false,
            expiration: None,
            created_at: None,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Publishes locator records through a relay pool
pub struct Publisher {
    pool: Arc<dyn RelayPool>,
    owns_pool: bool,
}

impl Publisher {
    /// Publisher with an internally owned pool
    pub fn new() -> Self {
        Self {
            pool: Arc::new(MemoryPool::new()),
            owns_pool: true,
        }
    }

    /// Publisher over an externally owned pool; [`Publisher::close`]
    /// will not touch it
    pub fn with_pool(pool: Arc<dyn RelayPool>) -> Self {
        Self {
            pool,
            owns_pool: false,
        }
    }

    pub fn pool(&self) -> Arc<dyn RelayPool> {
        self.pool.clone()
    }

    /// Publish `payload` to `relays`.
    ///
    /// Mode: `public` ⇒ cleartext; else a set `recipient` ⇒ sealed for
    /// that peer; else sealed for the publisher itself. Returns the
    /// signed event once at least one relay accepted it; fails with
    /// [`Error::Relay`] when every relay refused, [`Error::Timeout`] on
    /// deadline expiry, [`Error::Argument`] on bad input.
    pub async fn publish(
        &self,
        relays: &[String],
        signer: &dyn Signer,
        payload: &Payload,
        options: &PublishOptions,
    ) -> Result<Event> {
        let mode = if options.public {
            EncryptMode::Plain
        } else if let Some(recipient) = &options.recipient {
            let hex_pk = normalize_public_key(recipient)?;
            EncryptMode::ToPeer(parse_public_key(&hex_pk)?)
        } else {
            EncryptMode::ToSelf
        };
        self.publish_mode(relays, signer, payload, &mode, options).await
    }

    /// Publish `payload` sealed once for a set of recipients.
    ///
    /// The content carries one ciphertext under a fresh session key and
    /// a per-recipient envelope of that key; recipients resolve it like
    /// any other locator, everyone else sees an opaque container.
    pub async fn publish_wrapped(
        &self,
        relays: &[String],
        signer: &dyn Signer,
        recipients: &[String],
        payload: &Payload,
        options: &PublishOptions,
    ) -> Result<Event> {
        let mut keys = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let hex_pk = normalize_public_key(recipient)?;
            keys.push(parse_public_key(&hex_pk)?);
        }
        self.publish_mode(relays, signer, payload, &EncryptMode::Wrapped(keys), options)
            .await
    }

    async fn publish_mode(
        &self,
        relays: &[String],
        signer: &dyn Signer,
        payload: &Payload,
        mode: &EncryptMode,
        options: &PublishOptions,
    ) -> Result<Event> {
        if relays.is_empty() {
            return Err(Error::Argument("no relays to publish to".into()));
        }

        let encoded = payload::encode(payload)?;
        let event = build_locator(
            signer,
            &encoded,
            &options.identifier,
            mode,
            options.created_at.unwrap_or_else(unix_now),
            &BuildOptions {
                private: options.private_locator,
                expiration: options.expiration,
            },
        )
        .await?;

        let fanout = self.pool.publish(relays, &event, options.timeout);
        let outcomes = match tokio::time::timeout(options.timeout, fanout).await {
            Ok(outcomes) => outcomes,
            Err(_) => return Err(Error::Timeout("publish deadline elapsed".into())),
        };

        let accepted = outcomes.iter().filter(|o| o.accepted).count();
        if accepted == 0 {
            let reasons: Vec<String> = outcomes
                .iter()
                .map(|o| format!("{}: {}", o.relay, o.message))
                .collect();
            return Err(Error::Relay(reasons.join("; ")));
        }

        for outcome in outcomes.iter().filter(|o| !o.accepted) {
            warn!(relay = %outcome.relay, reason = %outcome.message, "relay refused locator");
        }
        debug!(event = %event.id, accepted, total = relays.len(), "locator published");
        Ok(event)
    }

    /// Close the pool if this publisher owns it
    pub async fn close(&self) {
        if self.owns_pool {
            self.pool.close().await;
        }
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::event::parse_wrapped;
    use lodestone_core::{open_locator, Endpoint, Keys};

    fn keys(seed: u8) -> Keys {
        Keys::from_secret_bytes(&[seed; 32]).unwrap()
    }

    fn relays(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    fn sample_payload() -> Payload {
        Payload::new(
            600,
            unix_now(),
            vec![Endpoint::new("tcp", "203.0.113.42:9735").with_family("ipv4")],
        )
    }

    #[tokio::test]
    async fn test_publish_defaults_to_self_sealed() {
        let pool = Arc::new(MemoryPool::new());
        let publisher = Publisher::with_pool(pool.clone());
        let author = keys(1);

        let event = publisher
            .publish(
                &relays(&["wss://a.example"]),
                &author,
                &sample_payload(),
                &PublishOptions::default(),
            )
            .await
            .unwrap();

        assert!(!event.content.starts_with('{'));
        assert_eq!(pool.relay("wss://a.example").event_count(), 1);

        let opened = open_locator(&event, Some(&author)).await.unwrap().unwrap();
        assert!(String::from_utf8(opened).unwrap().contains("203.0.113.42"));
    }

    #[tokio::test]
    async fn test_publish_public_mode() {
        let pool = Arc::new(MemoryPool::new());
        let publisher = Publisher::with_pool(pool.clone());

        let options = PublishOptions {
            public: true,
            ..Default::default()
        };
        let event = publisher
            .publish(&relays(&["wss://a.example"]), &keys(1), &sample_payload(), &options)
            .await
            .unwrap();

        assert!(event.content.starts_with('{'));
        assert!(event.content.contains("203.0.113.42"));
    }

    #[tokio::test]
    async fn test_publish_targeted_via_npub() {
        let pool = Arc::new(MemoryPool::new());
        let publisher = Publisher::with_pool(pool.clone());
        let alice = keys(1);
        let bob = keys(2);

        let options = PublishOptions {
            recipient: Some(bob.npub().unwrap()),
            ..Default::default()
        };
        let event = publisher
            .publish(&relays(&["wss://a.example"]), &alice, &sample_payload(), &options)
            .await
            .unwrap();

        let opened = open_locator(&event, Some(&bob)).await.unwrap().unwrap();
        assert!(String::from_utf8(opened).unwrap().contains("203.0.113.42"));
    }

    #[tokio::test]
    async fn test_publish_wrapped_container_shape() {
        let pool = Arc::new(MemoryPool::new());
        let publisher = Publisher::with_pool(pool.clone());
        let alice = keys(1);
        let bob = keys(2);
        let carol = keys(3);

        let event = publisher
            .publish_wrapped(
                &relays(&["wss://a.example"]),
                &alice,
                &[bob.public_key_hex(), carol.npub().unwrap()],
                &sample_payload(),
                &PublishOptions::default(),
            )
            .await
            .unwrap();

        let wrapped = parse_wrapped(&event.content).unwrap();
        assert_eq!(wrapped.wraps.len(), 2);
        assert!(wrapped.wraps.contains_key(&bob.public_key_hex()));
        assert!(wrapped.wraps.contains_key(&carol.public_key_hex()));
        assert!(!event.content.contains("203.0.113.42"));
    }

    #[tokio::test]
    async fn test_partial_success_is_success() {
        let pool = Arc::new(MemoryPool::new());
        let urls = relays(&["wss://a.example", "wss://b.example", "wss://c.example"]);
        pool.relay("wss://a.example").set_offline(true);
        pool.relay("wss://b.example").set_offline(true);

        let publisher = Publisher::with_pool(pool.clone());
        let event = publisher
            .publish(&urls, &keys(1), &sample_payload(), &PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(pool.relay("wss://c.example").event_count(), 1);
        event.verify().unwrap();
    }

    #[tokio::test]
    async fn test_unanimous_failure_concatenates_reasons() {
        let pool = Arc::new(MemoryPool::new());
        let urls = relays(&["wss://a.example", "wss://b.example"]);
        pool.relay("wss://a.example").set_offline(true);
        pool.relay("wss://b.example")
            .set_reject(Some("blocked: quota".into()));

        let publisher = Publisher::with_pool(pool);
        let err = publisher
            .publish(&urls, &keys(1), &sample_payload(), &PublishOptions::default())
            .await
            .unwrap_err();

        match err {
            Error::Relay(message) => {
                assert!(message.contains("wss://a.example"));
                assert!(message.contains("blocked: quota"));
            }
            other => panic!("expected relay error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_relay_list_rejected() {
        let publisher = Publisher::with_pool(Arc::new(MemoryPool::new()));
        let err = publisher
            .publish(&[], &keys(1), &sample_payload(), &PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[tokio::test]
    async fn test_invalid_payload_rejected_before_network() {
        let publisher = Publisher::with_pool(Arc::new(MemoryPool::new()));
        let empty = Payload::new(600, unix_now(), vec![]);
        let err = publisher
            .publish(
                &relays(&["wss://a.example"]),
                &keys(1),
                &empty,
                &PublishOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[tokio::test]
    async fn test_private_and_expiration_tags() {
        let pool = Arc::new(MemoryPool::new());
        let publisher = Publisher::with_pool(pool);

        let options = PublishOptions {
            private_locator: true,
            expiration: Some(unix_now() + 3600),
            ..Default::default()
        };
        let event = publisher
            .publish(&relays(&["wss://a.example"]), &keys(1), &sample_payload(), &options)
            .await
            .unwrap();

        assert_eq!(event.tag_value("private"), Some("true"));
        assert!(event.expiration().is_some());
    }
}
