//! bhs-feeder
//!
//! Keeps a blockhash archive populated just in time: blocks that hold open
//! requests get their hash archived before the ledger's native lookup window
//! (the most recent N blocks) forgets them.
//!
//! - [`Feeder`] is the reconciliation engine (one pass per [`Feeder::run_once`]).
//! - [`FeederService`] runs it on a fixed period, one run at a time.
//! - [`EventSource`], [`Archive`] and [`HeightProvider`] are the boundaries to
//!   the ledger; concrete adapters live in `bhs-rpc`, test doubles in
//!   `bhs-testkit`.
//!
//! Window state is in-memory only. A restart rebuilds it from the event source
//! and the archive, both of which are treated as ground truth.

mod archive;
mod engine;
mod service;
mod source;
mod types;
mod window;

pub use archive::{Archive, HeightProvider};
pub use engine::{Feeder, RunAbort, RunOutcome, RunReport};
pub use service::{FeederService, ReportSink};
pub use source::{EventSource, FanOutSource};
pub use types::{BlockNumber, Event, Phase};
pub use window::{ScanWindow, WindowParams};
