//! Fuzz test runner for the agentmesh coordination core.
//!
//! Run with: cargo run --release
//! Or: cargo test (for property-based tests)

use agentmesh_core_fuzz::*;
use proptest::prelude::*;
use std::time::Instant;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("fuzz runtime")
}

fn main() {
    println!("=== Coordination Core Fuzz Testing ===\n");

    let start = Instant::now();
    let mut total_tests = 0;
    let mut passed = 0;
    let mut failed = 0;

    println!("Running consensus evaluator fuzz tests...");
    let (p, f) = run_consensus_fuzz(200);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running proposal round-trip fuzz tests...");
    let (p, f) = run_roundtrip_fuzz(200);
    passed += p;
    failed += f;
    total_tests += p + f;

    println!("Running cache eviction fuzz tests...");
    let (p, f) = run_cache_fuzz(100);
    passed += p;
    failed += f;
    total_tests += p + f;

    let duration = start.elapsed();

    println!("\n=== Fuzz Testing Complete ===");
    println!("Total tests: {}", total_tests);
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!("Duration: {:?}", duration);

    if failed > 0 {
        std::process::exit(1);
    }
}

fn run_consensus_fuzz(iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut runner = proptest::test_runner::TestRunner::default();

    for i in 0..iterations {
        let input = arb_consensus_round().new_tree(&mut runner).expect("failed to generate ConsensusRoundInput").current();

        let violation = run_consensus_round(&input).filter(|r| r.is_violation());
        let deterministic = consensus_is_deterministic(&input);

        if violation.is_some() || !deterministic {
            println!("  [FAIL] Iteration {}: violation={:?} deterministic={}", i, violation, deterministic);
            failed += 1;
        } else {
            passed += 1;
        }
    }

    println!("  consensus_round: {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn run_roundtrip_fuzz(iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut runner = proptest::test_runner::TestRunner::default();
    let rt = runtime();

    for i in 0..iterations {
        let n = arb_participant_count().new_tree(&mut runner).expect("failed to generate participant count").current();
        let proposal_type = arb_proposal_type().new_tree(&mut runner).expect("failed to generate proposal type").current();
        let participants: Vec<String> = (1..=n as u8).map(|j| format!("{:064x}", j)).collect();

        let ok = rt.block_on(proposal_roundtrip(participants, proposal_type, 3600, None, None, 0));
        if !ok.unwrap_or(false) {
            println!("  [FAIL] Iteration {}: round-trip mismatch", i);
            failed += 1;
        } else {
            passed += 1;
        }
    }

    println!("  proposal_roundtrip: {} passed, {} failed", passed, failed);
    (passed, failed)
}

fn run_cache_fuzz(iterations: usize) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let rt = runtime();

    for i in 0..iterations {
        let max_entries = (i % 50) + 1;
        let count = i * 3;
        let result = rt.block_on(cache_eviction_round(count, max_entries));
        if result != CacheInvariantResult::Valid {
            println!("  [FAIL] Iteration {}: {:?}", i, result);
            failed += 1;
        } else {
            passed += 1;
        }
    }

    println!("  cache_eviction: {} passed, {} failed", passed, failed);
    (passed, failed)
}
