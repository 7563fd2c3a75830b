//! Event source boundary.
//!
//! An [`EventSource`] lists requests and fulfillments for one upstream
//! (typically one coordinator contract). [`FanOutSource`] composes several
//! sources behind the same trait.
//!
//! Sources are read-only and idempotent. No ordering is guaranteed and the
//! engine assumes none.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{BlockNumber, Event};

/// Upstream request/fulfillment contract.
///
/// Implementations must be `Send + Sync` so a feeder can be moved onto its
/// own task.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Short name used in logs and, when namespacing, as the id prefix.
    fn source_name(&self) -> &str;

    /// Requests whose block lies in `[from_block, to_block]`.
    async fn requests(&self, from_block: BlockNumber, to_block: BlockNumber)
        -> Result<Vec<Event>>;

    /// Fulfillments whose block is `>= from_block`.
    async fn fulfillments(&self, from_block: BlockNumber) -> Result<Vec<Event>>;
}

#[async_trait::async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    fn source_name(&self) -> &str {
        (**self).source_name()
    }

    async fn requests(
        &self,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Event>> {
        (**self).requests(from_block, to_block).await
    }

    async fn fulfillments(&self, from_block: BlockNumber) -> Result<Vec<Event>> {
        (**self).fulfillments(from_block).await
    }
}

/// Merges several sources into one.
///
/// Sources are queried in registration order. Any failing source fails the
/// whole fetch: a partial request list could hide open requests, and a
/// partial fulfillment list would trigger redundant writes.
///
/// With namespacing enabled every id is rewritten to `"<source>:<id>"`, so two
/// upstreams that reuse the same id space cannot close each other's requests.
pub struct FanOutSource {
    sources: Vec<Arc<dyn EventSource>>,
    namespace_ids: bool,
}

impl FanOutSource {
    pub fn new(sources: Vec<Arc<dyn EventSource>>) -> Self {
        Self {
            sources,
            namespace_ids: false,
        }
    }

    /// Prefix ids with the source name.
    pub fn namespaced(mut self) -> Self {
        self.namespace_ids = true;
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn tag(&self, source: &dyn EventSource, events: Vec<Event>) -> Vec<Event> {
        if !self.namespace_ids {
            return events;
        }
        let name = source.source_name();
        events
            .into_iter()
            .map(|e| Event {
                id: format!("{name}:{}", e.id),
                block: e.block,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EventSource for FanOutSource {
    fn source_name(&self) -> &str {
        "fan_out"
    }

    async fn requests(
        &self,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        for source in &self.sources {
            let events = source
                .requests(from_block, to_block)
                .await
                .with_context(|| format!("{}: requests", source.source_name()))?;
            out.extend(self.tag(source.as_ref(), events));
        }
        Ok(out)
    }

    async fn fulfillments(&self, from_block: BlockNumber) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        for source in &self.sources {
            let events = source
                .fulfillments(from_block)
                .await
                .with_context(|| format!("{}: fulfillments", source.source_name()))?;
            out.extend(self.tag(source.as_ref(), events));
        }
        Ok(out)
    }
}
