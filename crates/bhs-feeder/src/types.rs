use serde::{Deserialize, Serialize};

/// Block height on the ledger.
pub type BlockNumber = u64;

/// A request or a fulfillment, normalized across upstream event schemas.
///
/// A fulfillment carries the same `id` as the request it closes. Ids are only
/// unique within one upstream; see [`crate::FanOutSource`] for namespacing
/// when several upstreams are merged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Event {
    /// Correlation key shared by a request and its fulfillment.
    pub id: String,
    /// Block the event was included in.
    pub block: BlockNumber,
}

impl Event {
    pub fn new(id: impl Into<String>, block: BlockNumber) -> Self {
        Self {
            id: id.into(),
            block,
        }
    }
}

/// External call a run was waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Height,
    Requests,
    Fulfillments,
    ArchiveCheck,
    ArchiveWrite,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Height => "height",
            Phase::Requests => "requests",
            Phase::Fulfillments => "fulfillments",
            Phase::ArchiveCheck => "archive_check",
            Phase::ArchiveWrite => "archive_write",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
