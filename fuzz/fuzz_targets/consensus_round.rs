//! Property tests for the consensus evaluator against generated rounds.

use proptest::prelude::*;

use crate::arbitrary::arb_consensus_round;
use crate::scenarios::{consensus_is_deterministic, run_consensus_round};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn evaluator_never_violates_invariants(input in arb_consensus_round()) {
        if let Some(result) = run_consensus_round(&input) {
            prop_assert!(!result.is_violation(), "invariant violated: {:?}", result);
        }
    }

    #[test]
    fn evaluator_is_deterministic(input in arb_consensus_round()) {
        prop_assert!(consensus_is_deterministic(&input));
    }
}
