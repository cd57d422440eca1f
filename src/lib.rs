//! Coordination and discovery core for a peer-to-peer AI agent network.
//!
//! Four engines, built leaves-first:
//! proposal/vote authoring & parsing, a pluggable consensus evaluator, an
//! escrow coordinator, and a result aggregator make up the coordination
//! protocol; a capability query service, an LRU+TTL capability cache, and
//! k-hop social discovery make up capability discovery. The crate speaks to
//! the outside world only through the three traits in [`transport`]: the
//! event store, the signer/transport, and the follow-graph router.

pub mod cache;
pub mod capability;
pub mod consensus;
pub mod coordinator;
pub mod errors;
pub mod escrow;
pub mod proposal;
pub mod record;
pub mod result;
pub mod social;
pub mod transport;
pub mod vote;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use errors::{CoordinationError, Result};
