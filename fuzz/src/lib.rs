//! Property-based fuzz testing library for the agentmesh coordination core.
//!
//! # Usage
//!
//! ```bash
//! # Run all property-based tests
//! cargo test --release
//!
//! # Run the fuzz test runner
//! cargo run --release
//!
//! # Run with more iterations
//! PROPTEST_CASES=10000 cargo test --release
//! ```

pub mod arbitrary;
pub mod invariants;
pub mod scenarios;

pub use arbitrary::*;
pub use invariants::*;
pub use scenarios::*;

#[cfg(test)]
#[path = "../fuzz_targets/consensus_round.rs"]
mod consensus_round_tests;

#[cfg(test)]
#[path = "../fuzz_targets/proposal_roundtrip.rs"]
mod proposal_roundtrip_tests;

#[cfg(test)]
#[path = "../fuzz_targets/cache_eviction.rs"]
mod cache_eviction_tests;
