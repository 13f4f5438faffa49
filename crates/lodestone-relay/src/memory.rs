//! In-memory relay and pool
//!
//! A hermetic implementation of the relay side: each [`MemoryRelay`]
//! stores events with replaceable-record semantics and answers filter
//! queries; [`MemoryPool`] implements [`RelayPool`] over a set of named
//! relays. Used by the test suites and by embeddings that want an
//! in-process event bus. Fault injection (offline relays, publish
//! rejection) covers the partial-failure paths.

use crate::message::Filter;
use crate::pool::{PublishOutcome, RelayPool};
use async_trait::async_trait;
use lodestone_core::error::{Error, Result};
use lodestone_core::{sort_newest_first, Event};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Replaceability scope of an event kind
fn replaceable_key(event: &Event) -> Option<(String, u16, String)> {
    match event.kind {
        // parameterized replaceable: (pubkey, kind, d)
        30000..=39999 => Some((
            event.pubkey.clone(),
            event.kind,
            event.identifier().unwrap_or_default().to_string(),
        )),
        // plain replaceable: (pubkey, kind)
        0 | 3 | 10000..=19999 => Some((event.pubkey.clone(), event.kind, String::new())),
        _ => None,
    }
}

/// Single in-memory relay
pub struct MemoryRelay {
    events: RwLock<Vec<Event>>,
    offline: RwLock<bool>,
    reject_reason: RwLock<Option<String>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            offline: RwLock::new(false),
            reject_reason: RwLock::new(None),
        }
    }

    /// Simulate the relay being unreachable
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    /// Make the relay reject every publish with `reason`
    pub fn set_reject(&self, reason: Option<String>) {
        *self.reject_reason.write() = reason;
    }

    pub fn is_offline(&self) -> bool {
        *self.offline.read()
    }

    /// Accept an event, enforcing signatures and replaceable-record
    /// semantics: for a replaceable kind only the latest `created_at`
    /// survives, ties resolved to the smaller id.
    pub fn submit(&self, event: Event) -> std::result::Result<(), String> {
        if let Some(reason) = self.reject_reason.read().clone() {
            return Err(reason);
        }
        if event.verify().is_err() {
            return Err("invalid: bad signature".into());
        }

        let mut events = self.events.write();
        if events.iter().any(|e| e.id == event.id) {
            // duplicates are a no-op acknowledgement
            return Ok(());
        }

        if let Some(key) = replaceable_key(&event) {
            if let Some(pos) = events
                .iter()
                .position(|e| replaceable_key(e).as_ref() == Some(&key))
            {
                let held = &events[pos];
                let newer = event.created_at > held.created_at
                    || (event.created_at == held.created_at && event.id < held.id);
                if newer {
                    events.remove(pos);
                } else {
                    // older instance of a replaceable record: acknowledge, keep ours
                    return Ok(());
                }
            }
        }

        events.push(event);
        Ok(())
    }

    /// Store an event without validation, modelling a misbehaving or
    /// compromised relay
    pub fn inject(&self, event: Event) {
        self.events.write().push(event);
    }

    /// Stored events matching `filter`, newest first, capped at
    /// `filter.limit`
    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        let events = self.events.read();
        let mut matched: Vec<Event> = events.iter().filter(|e| filter.matches(e)).cloned().collect();
        sort_newest_first(&mut matched);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// [`RelayPool`] over a set of named in-memory relays
///
/// Relays are created on first reference, so a URL used in a publish
/// and later in a query addresses the same store.
pub struct MemoryPool {
    relays: RwLock<HashMap<String, Arc<MemoryRelay>>>,
    closed: RwLock<bool>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self {
            relays: RwLock::new(HashMap::new()),
            closed: RwLock::new(false),
        }
    }

    /// Get or create the relay behind `url`
    pub fn relay(&self, url: &str) -> Arc<MemoryRelay> {
        self.relays
            .write()
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(MemoryRelay::new()))
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayPool for MemoryPool {
    async fn publish(
        &self,
        relays: &[String],
        event: &Event,
        _deadline: Duration,
    ) -> Vec<PublishOutcome> {
        let mut outcomes = Vec::with_capacity(relays.len());
        for url in relays {
            if self.is_closed() {
                outcomes.push(PublishOutcome::failed(url, "pool closed"));
                continue;
            }
            let relay = self.relay(url);
            if relay.is_offline() {
                outcomes.push(PublishOutcome::failed(url, "connection refused"));
                continue;
            }
            match relay.submit(event.clone()) {
                Ok(()) => outcomes.push(PublishOutcome::accepted(url)),
                Err(reason) => outcomes.push(PublishOutcome::failed(url, reason)),
            }
        }
        outcomes
    }

    async fn query(
        &self,
        relays: &[String],
        filter: &Filter,
        _deadline: Duration,
    ) -> Result<Vec<Event>> {
        if self.is_closed() {
            return Err(Error::Relay("pool closed".into()));
        }

        let mut events: Vec<Event> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let mut responded = false;

        for url in relays {
            let relay = self.relay(url);
            if relay.is_offline() {
                debug!(relay = %url, "relay unreachable, skipping");
                failures.push(format!("{url}: connection refused"));
                continue;
            }
            responded = true;
            for event in relay.query(filter) {
                if !events.iter().any(|e| e.id == event.id) {
                    events.push(event);
                }
            }
        }

        if !responded {
            return Err(Error::Relay(format!(
                "all relays failed: {}",
                failures.join("; ")
            )));
        }
        Ok(events)
    }

    async fn close(&self) {
        *self.closed.write() = true;
        self.relays.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::event::{build_locator, BuildOptions, EncryptMode};
    use lodestone_core::Keys;

    fn keys(seed: u8) -> Keys {
        Keys::from_secret_bytes(&[seed; 32]).unwrap()
    }

    async fn locator(author: &Keys, identifier: &str, created_at: u64) -> Event {
        build_locator(
            author,
            br#"{"v":1,"ttl":60,"updated_at":1,"endpoints":[{"type":"tcp","url":"10.0.0.1:1"}]}"#,
            identifier,
            &EncryptMode::Plain,
            created_at,
            &BuildOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_replaceable_keeps_latest_only() {
        let relay = MemoryRelay::new();
        let author = keys(1);

        relay.submit(locator(&author, "addr", 100).await).unwrap();
        relay.submit(locator(&author, "addr", 200).await).unwrap();
        assert_eq!(relay.event_count(), 1);

        let stored = &relay.query(&Filter::new())[0];
        assert_eq!(stored.created_at, 200);

        // stale instance is acknowledged but ignored
        relay.submit(locator(&author, "addr", 150).await).unwrap();
        assert_eq!(relay.query(&Filter::new())[0].created_at, 200);
    }

    #[tokio::test]
    async fn test_distinct_identifiers_coexist() {
        let relay = MemoryRelay::new();
        let author = keys(1);

        relay.submit(locator(&author, "addr", 100).await).unwrap();
        relay.submit(locator(&author, "backup", 100).await).unwrap();
        assert_eq!(relay.event_count(), 2);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let relay = MemoryRelay::new();
        let mut event = locator(&keys(1), "addr", 100).await;
        event.content.push(' ');
        assert!(relay.submit(event).is_err());
    }

    #[tokio::test]
    async fn test_pool_publish_outcomes() {
        let pool = MemoryPool::new();
        let relays = vec![
            "wss://a.example".to_string(),
            "wss://b.example".to_string(),
            "wss://c.example".to_string(),
        ];
        pool.relay("wss://a.example").set_offline(true);
        pool.relay("wss://b.example")
            .set_reject(Some("blocked: quota".into()));

        let event = locator(&keys(1), "addr", 100).await;
        let outcomes = pool
            .publish(&relays, &event, Duration::from_secs(1))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].accepted);
        assert!(!outcomes[1].accepted);
        assert!(outcomes[2].accepted);
    }

    #[tokio::test]
    async fn test_pool_query_dedups_and_tolerates_partial_failure() {
        let pool = MemoryPool::new();
        let relays = vec![
            "wss://a.example".to_string(),
            "wss://b.example".to_string(),
            "wss://down.example".to_string(),
        ];
        let event = locator(&keys(1), "addr", 100).await;
        pool.relay("wss://a.example").submit(event.clone()).unwrap();
        pool.relay("wss://b.example").submit(event.clone()).unwrap();
        pool.relay("wss://down.example").set_offline(true);

        let events = pool
            .query(&relays, &Filter::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_pool_query_all_failed() {
        let pool = MemoryPool::new();
        let relays = vec!["wss://down.example".to_string()];
        pool.relay("wss://down.example").set_offline(true);

        let err = pool
            .query(&relays, &Filter::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Relay(_)));
    }

    #[tokio::test]
    async fn test_get_picks_newest_with_tie_break() {
        let pool = MemoryPool::new();
        let relays = vec!["wss://a.example".to_string(), "wss://b.example".to_string()];

        // two different authors so the records are not replaceable peers
        let e1 = locator(&keys(1), "addr", 100).await;
        let e2 = locator(&keys(2), "addr", 100).await;
        pool.relay("wss://a.example").submit(e1.clone()).unwrap();
        pool.relay("wss://b.example").submit(e2.clone()).unwrap();

        let winner = pool
            .get(&relays, &Filter::new(), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        let smaller = if e1.id < e2.id { e1 } else { e2 };
        assert_eq!(winner.id, smaller.id);
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_work() {
        let pool = MemoryPool::new();
        pool.close().await;

        let relays = vec!["wss://a.example".to_string()];
        assert!(pool
            .query(&relays, &Filter::new(), Duration::from_secs(1))
            .await
            .is_err());
        let outcomes = pool
            .publish(
                &relays,
                &locator(&keys(1), "addr", 100).await,
                Duration::from_secs(1),
            )
            .await;
        assert!(!outcomes[0].accepted);
    }
}
