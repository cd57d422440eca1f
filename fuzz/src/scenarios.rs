//! Scenario builders: turn a generated [`crate::arbitrary::ConsensusRoundInput`]
//! (or cache/round-trip parameters) into a concrete run against the real
//! consensus evaluator, proposal author/parser, or capability cache.

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_core::consensus::{self, Outcome};
use agentmesh_core::errors::Result;
use agentmesh_core::proposal::{self, Action, Proposal, ProposalAuthorInput};
use agentmesh_core::testing::{FakeEventStore, FakeSigner, FixedClock};
use agentmesh_core::vote::{Vote, VoteChoice};

use crate::arbitrary::ConsensusRoundInput;
use crate::invariants::{check_cache_size_invariant, check_consensus_invariants, ConsensusInvariantResult};

fn build_proposal(input: &ConsensusRoundInput) -> Proposal {
    Proposal {
        id: "p".repeat(32),
        coordinator: "c".repeat(64),
        proposal_type: input.proposal_type,
        participants: input.participants.clone(),
        threshold: input.threshold,
        quorum: input.quorum,
        expires_at: input.expires_at,
        action: None,
        weights: input.weights.clone(),
        stake_required: None,
        escrow_address: None,
        stakes: HashMap::new(),
        content: "fuzz".into(),
        created_at: input.now,
    }
}

fn build_votes(input: &ConsensusRoundInput) -> HashMap<String, Vote> {
    input
        .votes
        .iter()
        .map(|(voter, choice)| {
            (
                voter.clone(),
                Vote {
                    event_id: format!("ve-{voter}"),
                    proposal_event_id: "e".into(),
                    proposal_id: "p".repeat(32),
                    voter: voter.clone(),
                    vote: *choice,
                    reason: None,
                    rank: None,
                    created_at: input.now,
                },
            )
        })
        .collect()
}

/// Evaluate one generated consensus round and check the evaluator's
/// invariants against it. Ranked/Allocation proposals are expected to
/// raise `UnsupportedCoordinationType`, which is not itself a violation.
pub fn run_consensus_round(input: &ConsensusRoundInput) -> Option<ConsensusInvariantResult> {
    let proposal = build_proposal(input);
    let votes = build_votes(input);

    match consensus::evaluate(&proposal, &votes, input.now) {
        Ok(outcome) => Some(check_consensus_invariants(
            &proposal.participants,
            &votes,
            proposal.quorum,
            proposal.weights.is_some(),
            proposal.proposal_type,
            input.now,
            proposal.expires_at,
            outcome,
        )),
        Err(_) => None,
    }
}

/// Evaluate the same round twice and require the evaluator to be
/// deterministic — same proposal, same votes, same `now` must always give
/// the same outcome.
pub fn consensus_is_deterministic(input: &ConsensusRoundInput) -> bool {
    let proposal = build_proposal(input);
    let votes = build_votes(input);
    let a = consensus::evaluate(&proposal, &votes, input.now);
    let b = consensus::evaluate(&proposal, &votes, input.now);
    match (a, b) {
        (Ok(x), Ok(y)) => x == y,
        (Err(_), Err(_)) => true,
        _ => false,
    }
}

/// Author then parse a proposal, asserting the parsed value's
/// evaluation-relevant fields match the input that authored it.
pub async fn proposal_roundtrip(
    participants: Vec<String>,
    proposal_type: agentmesh_core::proposal::ProposalType,
    expires_in_seconds: i64,
    threshold: Option<u64>,
    quorum: Option<u64>,
    now: i64,
) -> Result<bool> {
    let signer = FakeSigner::new("c".repeat(64));
    let input = ProposalAuthorInput {
        proposal_type,
        participants: participants.clone(),
        expires_in_seconds,
        description: "fuzz round-trip".into(),
        threshold,
        quorum,
        action: None,
        weights: None,
        stake_required: None,
        coordinator_payment_address: None,
    };
    let (record, authored) = proposal::author(&signer, input, now).await?;
    let parsed = proposal::parse(&record, now)?;

    Ok(parsed.proposal_type == authored.proposal_type
        && parsed.participants == authored.participants
        && parsed.threshold == authored.threshold
        && parsed.quorum == authored.quorum
        && parsed.expires_at == authored.expires_at)
}

/// An action payload that is not valid JSON must be rejected at authoring
/// time rather than silently accepted.
pub async fn malformed_action_is_rejected(garbage: String) -> bool {
    let signer = FakeSigner::new("c".repeat(64));
    let input = ProposalAuthorInput {
        proposal_type: agentmesh_core::proposal::ProposalType::Consensus,
        participants: vec!["a".repeat(64)],
        expires_in_seconds: 3600,
        description: "x".into(),
        threshold: None,
        quorum: None,
        action: Some(Action { kind: 1, data: garbage }),
        weights: None,
        stake_required: None,
        coordinator_payment_address: None,
    };
    proposal::author(&signer, input, 0).await.is_err()
}

/// Insert `count` capabilities into a cache configured with `max_entries`
/// and assert its size never exceeds the configured bound.
pub async fn cache_eviction_round(count: usize, max_entries: usize) -> crate::invariants::CacheInvariantResult {
    use agentmesh_core::cache::{CacheConfig, CapabilityCache};
    use agentmesh_core::capability::{AgentType, Capability};
    use std::collections::HashSet;

    let store = FakeEventStore::new(Vec::new());
    let clock = Arc::new(FixedClock::new(0));
    let config = CacheConfig { max_entries, ..CacheConfig::default() };
    let cache = CapabilityCache::new(&store, config, clock).await.expect("cache warm-up never fails against an empty store");

    for i in 0..count {
        let capability = Capability {
            author: format!("{:064x}", i + 1),
            identifier: format!("g.agent{i}"),
            supported_kinds: HashSet::from([5000]),
            supported_nips: HashSet::new(),
            agent_type: AgentType::Dvm,
            payment_address: format!("g.agent{i}.pay"),
            pricing: HashMap::new(),
            capacity: None,
            model: None,
            skills: None,
            metadata: serde_json::Value::Null,
            created_at: 0,
        };
        cache.set(capability).await;
    }

    check_cache_size_invariant(cache.size().await, max_entries)
}
