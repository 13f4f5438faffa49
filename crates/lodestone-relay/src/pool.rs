//! Relay pool abstraction
//!
//! The resolver and publisher talk to relays exclusively through this
//! trait: fan-out publish with per-relay outcomes, filter queries with a
//! per-call deadline, and a newest-event convenience on top. Transport
//! details (sockets, reconnects, subscription management) live behind
//! the implementation; the one in [`crate::memory`] is hermetic.

use crate::message::Filter;
use async_trait::async_trait;
use lodestone_core::error::Result;
use lodestone_core::{sort_newest_first, Event};
use std::time::Duration;

/// Result of offering an event to one relay
#[derive(Clone, Debug)]
pub struct PublishOutcome {
    pub relay: String,
    pub accepted: bool,
    /// Relay acknowledgement text, or the transport error
    pub message: String,
}

impl PublishOutcome {
    pub fn accepted(relay: impl Into<String>) -> Self {
        Self {
            relay: relay.into(),
            accepted: true,
            message: String::new(),
        }
    }

    pub fn failed(relay: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            relay: relay.into(),
            accepted: false,
            message: message.into(),
        }
    }
}

/// Pool of relay connections
///
/// Implementations are expected to deduplicate events by id across
/// relays, to coalesce concurrent identical subscriptions into one wire
/// request, to honour the supplied deadline for every network
/// operation, and to abandon (not leak) work that outlives the
/// deadline.
#[async_trait]
pub trait RelayPool: Send + Sync {
    /// Offer `event` to every relay in `relays`, concurrently.
    ///
    /// Always returns one outcome per relay; transport failures are
    /// reported as non-accepted outcomes rather than errors.
    async fn publish(
        &self,
        relays: &[String],
        event: &Event,
        deadline: Duration,
    ) -> Vec<PublishOutcome>;

    /// Collect stored events matching `filter` across `relays`,
    /// deduplicated by id.
    ///
    /// Fails with `Error::Relay` only when every relay failed before
    /// producing events; partial relay failures are tolerated.
    async fn query(
        &self,
        relays: &[String],
        filter: &Filter,
        deadline: Duration,
    ) -> Result<Vec<Event>>;

    /// The single newest event matching `filter` across `relays`
    /// (descending `created_at`, ties to the smaller id).
    async fn get(
        &self,
        relays: &[String],
        filter: &Filter,
        deadline: Duration,
    ) -> Result<Option<Event>> {
        let mut events = self.query(relays, filter, deadline).await?;
        sort_newest_first(&mut events);
        Ok(events.into_iter().next())
    }

    /// Release connections. A pool owned by a resolver/publisher is
    /// closed by its owner; an externally supplied pool must only be
    /// closed by whoever created it.
    async fn close(&self);
}
