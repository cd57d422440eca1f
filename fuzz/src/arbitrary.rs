//! Arbitrary input generators for fuzz testing.
//!
//! Generates random but valid inputs for exercising the consensus evaluator
//! and capability cache.

use std::collections::HashMap;

use agentmesh_core::proposal::ProposalType;
use proptest::prelude::*;

/// A 64-hex-char pubkey, with a handful of fixed ids so generated vote sets
/// actually overlap generated participant sets often enough to be useful.
pub fn arb_pubkey() -> impl Strategy<Value = String> {
    (1u8..=20).prop_map(|i| format!("{:064x}", i))
}

pub fn arb_proposal_type() -> impl Strategy<Value = ProposalType> {
    prop_oneof![
        Just(ProposalType::Consensus),
        Just(ProposalType::Majority),
        Just(ProposalType::Threshold),
        Just(ProposalType::Ranked),
        Just(ProposalType::Allocation),
    ]
}

/// Arbitrary participant count, weighted toward small groups (the common
/// case) with an occasional larger group.
pub fn arb_participant_count() -> impl Strategy<Value = usize> {
    prop_oneof![
        9 => 1usize..=8,
        1 => 9usize..=64,
    ]
}

/// Arbitrary weight value, including the edge cases the clamp rule cares
/// about: zero, negative, and very large.
pub fn arb_weight() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(-1.0),
        Just(-1000.0),
        (0.01f64..1000.0),
    ]
}

/// Arbitrary vote choice.
pub fn arb_vote_choice() -> impl Strategy<Value = agentmesh_core::vote::VoteChoice> {
    prop_oneof![
        Just(agentmesh_core::vote::VoteChoice::Approve),
        Just(agentmesh_core::vote::VoteChoice::Reject),
        Just(agentmesh_core::vote::VoteChoice::Abstain),
    ]
}

/// A generated consensus round: a participant set, a proposal type,
/// optional threshold/quorum, optional weights, and a subset of
/// participants who have voted (with their choices).
#[derive(Debug, Clone)]
pub struct ConsensusRoundInput {
    pub participants: Vec<String>,
    pub proposal_type: ProposalType,
    pub threshold: Option<u64>,
    pub quorum: Option<u64>,
    pub weights: Option<HashMap<String, f64>>,
    pub votes: Vec<(String, agentmesh_core::vote::VoteChoice)>,
    pub now: i64,
    pub expires_at: i64,
}

pub fn arb_consensus_round() -> impl Strategy<Value = ConsensusRoundInput> {
    (arb_participant_count(), arb_proposal_type(), any::<bool>(), any::<bool>(), any::<bool>(), 0i64..10_000)
        .prop_flat_map(|(n, proposal_type, use_threshold, use_quorum, use_weights, now)| {
            let participants: Vec<String> = (1..=n as u8).map(|i| format!("{:064x}", i)).collect();

            let threshold_strategy: proptest::strategy::BoxedStrategy<Option<u64>> =
                if use_threshold { (1u64..=n as u64).prop_map(Some).boxed() } else { Just(None).boxed() };
            let quorum_strategy: proptest::strategy::BoxedStrategy<Option<u64>> =
                if use_quorum { (1u64..=n as u64).prop_map(Some).boxed() } else { Just(None).boxed() };
            let weights_strategy: proptest::strategy::BoxedStrategy<Option<HashMap<String, f64>>> = if use_weights {
                proptest::collection::vec(arb_weight(), n)
                    .prop_map({
                        let participants = participants.clone();
                        move |ws| Some(participants.iter().cloned().zip(ws).collect::<HashMap<_, _>>())
                    })
                    .boxed()
            } else {
                Just(None).boxed()
            };
            // A subset of participants vote; choice per voter is generated too.
            let votes_strategy = proptest::collection::vec(arb_vote_choice(), n).prop_map({
                let participants = participants.clone();
                move |choices| {
                    participants
                        .iter()
                        .cloned()
                        .zip(choices)
                        .enumerate()
                        .filter_map(|(i, (p, c))| if i % 2 == 0 { Some((p, c)) } else { None })
                        .collect::<Vec<_>>()
                }
            });

            (threshold_strategy, quorum_strategy, weights_strategy, votes_strategy, 1i64..20_000).prop_map(
                move |(threshold, quorum, weights, votes, offset)| ConsensusRoundInput {
                    participants: participants.clone(),
                    proposal_type,
                    threshold,
                    quorum,
                    weights,
                    votes,
                    now,
                    expires_at: now + offset,
                },
            )
        })
}
