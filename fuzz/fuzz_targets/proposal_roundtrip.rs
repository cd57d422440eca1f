//! Property tests for proposal authoring + parsing round-trips.

use proptest::prelude::*;

use crate::arbitrary::{arb_participant_count, arb_proposal_type};
use crate::scenarios::{malformed_action_is_rejected, proposal_roundtrip};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("fuzz runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn authored_proposal_round_trips(
        n in arb_participant_count(),
        proposal_type in arb_proposal_type(),
        expires_in in 1i64..100_000,
        threshold_raw in 0u64..65,
        quorum_raw in 0u64..65,
    ) {
        let participants: Vec<String> = (1..=n as u8).map(|i| format!("{:064x}", i)).collect();
        let threshold = if threshold_raw == 0 || threshold_raw as usize > n { None } else { Some(threshold_raw) };
        let quorum = if quorum_raw == 0 { None } else { Some(quorum_raw) };

        let ok = runtime().block_on(proposal_roundtrip(participants, proposal_type, expires_in, threshold, quorum, 0));
        prop_assert!(ok.unwrap_or(false));
    }

    #[test]
    fn garbage_action_data_is_always_rejected(
        garbage in "[a-z]{1,20}".prop_filter("must not be a JSON keyword", |s| !matches!(s.as_str(), "true" | "false" | "null"))
    ) {
        let rejected = runtime().block_on(malformed_action_is_rejected(garbage));
        prop_assert!(rejected);
    }
}
