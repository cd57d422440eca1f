//! End-to-end scenarios against the public API: author a proposal, collect
//! votes, evaluate, and publish a result — the same path a real transport
//! would drive, wired here to the in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_core::cache::{CacheConfig, CapabilityCache};
use agentmesh_core::capability::{AgentType, Capability};
use agentmesh_core::consensus::{self, Outcome};
use agentmesh_core::proposal::{self, Action, ProposalAuthorInput, ProposalType};
use agentmesh_core::social::{discover_for_kind, DiscoveryOptions};
use agentmesh_core::testing::{FakeEventStore, FakeRouter, FakeSigner, FixedClock};
use agentmesh_core::transport::{EventStore, Follow};
use agentmesh_core::vote::{self, VoteChoice};

fn pubkey(c: char) -> String {
    c.to_string().repeat(64)
}

#[tokio::test]
async fn approved_threshold_publishes_expected_tally() {
    let coordinator = FakeSigner::new(pubkey('c'));
    let a = FakeSigner::new(pubkey('a'));
    let b = FakeSigner::new(pubkey('b'));

    let input = ProposalAuthorInput {
        proposal_type: ProposalType::Threshold,
        participants: vec![pubkey('a'), pubkey('b'), pubkey('d')],
        expires_in_seconds: 3600,
        description: "ship the release".into(),
        threshold: Some(2),
        quorum: None,
        action: None,
        weights: None,
        stake_required: None,
        coordinator_payment_address: None,
    };
    let (proposal_record, proposal) = proposal::author(&coordinator, input, 0).await.unwrap();

    let mut votes = HashMap::new();
    let (_, vote_a) = vote::author(&a, &proposal_record.id, &proposal, VoteChoice::Approve, None, None, 10).await.unwrap();
    let (_, vote_b) = vote::author(&b, &proposal_record.id, &proposal, VoteChoice::Approve, None, None, 11).await.unwrap();
    votes.insert(vote_a.voter.clone(), vote_a);
    votes.insert(vote_b.voter.clone(), vote_b);

    let outcome = consensus::evaluate(&proposal, &votes, 100).unwrap();
    assert_eq!(outcome, Outcome::Approved);

    let (_, result) = agentmesh_core::result::author(&coordinator, &proposal_record.id, &proposal, &votes, outcome, 100).await.unwrap();
    assert_eq!(result.tally, (2, 0, 0));
    assert_eq!(result.participation, (2, 3));
    assert_eq!(result.content, "Proposal approved with 2/0/0 votes.");
}

#[tokio::test]
async fn weighted_rejection_by_high_weight_reject() {
    let coordinator = FakeSigner::new(pubkey('c'));
    let a = FakeSigner::new(pubkey('a'));

    let mut weights = HashMap::new();
    weights.insert(pubkey('a'), 10.0);
    weights.insert(pubkey('b'), 1.0);
    weights.insert(pubkey('d'), 1.0);

    let input = ProposalAuthorInput {
        proposal_type: ProposalType::Threshold,
        participants: vec![pubkey('a'), pubkey('b'), pubkey('d')],
        expires_in_seconds: 3600,
        description: "budget reallocation".into(),
        threshold: Some(2),
        quorum: None,
        action: None,
        weights: Some(weights),
        stake_required: None,
        coordinator_payment_address: None,
    };
    let (proposal_record, proposal) = proposal::author(&coordinator, input, 0).await.unwrap();

    let mut votes = HashMap::new();
    let (_, vote_a) = vote::author(&a, &proposal_record.id, &proposal, VoteChoice::Reject, None, None, 10).await.unwrap();
    votes.insert(vote_a.voter.clone(), vote_a);

    let outcome = consensus::evaluate(&proposal, &votes, 20).unwrap();
    assert_eq!(outcome, Outcome::Rejected);
}

#[tokio::test]
async fn quorum_miss_is_pending_then_inconclusive() {
    let coordinator = FakeSigner::new(pubkey('c'));
    let a = FakeSigner::new(pubkey('a'));

    let input = ProposalAuthorInput {
        proposal_type: ProposalType::Consensus,
        participants: vec![pubkey('a'), pubkey('b'), pubkey('d')],
        expires_in_seconds: 1000,
        description: "quorum test".into(),
        threshold: None,
        quorum: Some(2),
        action: None,
        weights: None,
        stake_required: None,
        coordinator_payment_address: None,
    };
    let (proposal_record, proposal) = proposal::author(&coordinator, input, 0).await.unwrap();

    let mut votes = HashMap::new();
    let (_, vote_a) = vote::author(&a, &proposal_record.id, &proposal, VoteChoice::Approve, None, None, 10).await.unwrap();
    votes.insert(vote_a.voter.clone(), vote_a);

    assert_eq!(consensus::evaluate(&proposal, &votes, 500).unwrap(), Outcome::Pending);
    assert_eq!(consensus::evaluate(&proposal, &votes, 1500).unwrap(), Outcome::Inconclusive);
}

#[tokio::test]
async fn approved_action_emits_record_and_invalid_json_is_skipped() {
    let coordinator = FakeSigner::new(pubkey('c'));
    let a = FakeSigner::new(pubkey('a'));
    let b = FakeSigner::new(pubkey('b'));

    let valid_input = ProposalAuthorInput {
        proposal_type: ProposalType::Threshold,
        participants: vec![pubkey('a'), pubkey('b'), pubkey('d')],
        expires_in_seconds: 3600,
        description: "run task".into(),
        threshold: Some(2),
        quorum: None,
        action: Some(Action { kind: 1000, data: "{\"task\":\"x\"}".into() }),
        weights: None,
        stake_required: None,
        coordinator_payment_address: None,
    };
    let (proposal_record, mut proposal) = proposal::author(&coordinator, valid_input, 0).await.unwrap();

    let mut votes = HashMap::new();
    let (_, vote_a) = vote::author(&a, &proposal_record.id, &proposal, VoteChoice::Approve, None, None, 10).await.unwrap();
    let (_, vote_b) = vote::author(&b, &proposal_record.id, &proposal, VoteChoice::Approve, None, None, 11).await.unwrap();
    votes.insert(vote_a.voter.clone(), vote_a);
    votes.insert(vote_b.voter.clone(), vote_b);

    let outcome = consensus::evaluate(&proposal, &votes, 100).unwrap();
    let published = agentmesh_core::result::create_result_with_action(&coordinator, &proposal_record.id, &mut proposal, &votes, outcome, 100).await.unwrap();

    assert_eq!(published.result.outcome, Outcome::Approved);
    let action_record = published.action_record.expect("valid JSON action must be emitted");
    assert_eq!(action_record.kind, 1000);
    assert_eq!(action_record.content, "{\"task\":\"x\"}");

    // Same proposal, but with malformed action data: the result still
    // publishes, the action record does not.
    proposal.action = Some(Action { kind: 1000, data: "invalid json {".into() });
    let published_invalid =
        agentmesh_core::result::create_result_with_action(&coordinator, &proposal_record.id, &mut proposal, &votes, outcome, 100).await.unwrap();
    assert!(published_invalid.action_record.is_none());
    assert_eq!(published_invalid.result.outcome, Outcome::Approved);
}

#[tokio::test]
async fn cache_eviction_is_least_recently_accessed() {
    let store = FakeEventStore::new(Vec::new());
    let clock = Arc::new(FixedClock::new(0));
    let cache = CapabilityCache::new(&store, CacheConfig { max_entries: 2, ..CacheConfig::default() }, clock).await.unwrap();

    let capability = |author: &str| Capability {
        author: author.into(),
        identifier: format!("g.{author}.agent"),
        supported_kinds: std::collections::HashSet::from([5000]),
        supported_nips: std::collections::HashSet::new(),
        agent_type: AgentType::Dvm,
        payment_address: format!("g.{author}.pay"),
        pricing: HashMap::new(),
        capacity: None,
        model: None,
        skills: None,
        metadata: serde_json::Value::Null,
        created_at: 0,
    };

    cache.set(capability(&pubkey('1'))).await;
    cache.set(capability(&pubkey('2'))).await;

    // Reading P1 refreshes its access time ahead of P2's.
    assert!(cache.get(&pubkey('1')).await.is_some());

    cache.set(capability(&pubkey('3'))).await;

    assert!(cache.get(&pubkey('2')).await.is_none());
    assert!(cache.get(&pubkey('1')).await.is_some());
    assert!(cache.get(&pubkey('3')).await.is_some());
    assert_eq!(cache.metrics().evictions, 1);
}

#[tokio::test]
async fn social_discovery_degrades_to_one_hop_on_two_hop_failure() {
    let self_pubkey = pubkey('s');
    let a = pubkey('a');
    let b = pubkey('b');

    let router = FakeRouter::new(vec![
        Follow { pubkey: a.clone(), payment_address: "g.a.agent".into(), nickname: None, relay_hint: None, added_at: 0 },
        Follow { pubkey: b.clone(), payment_address: "g.b.agent".into(), nickname: None, relay_hint: None, added_at: 0 },
    ]);

    let cap_record = |author: &str, supported_kind: u32| agentmesh_core::record::SignedRecord {
        id: format!("cap-{author}"),
        author_pubkey: author.into(),
        created_at: 1,
        kind: agentmesh_core::record::kind::CAPABILITY,
        tags: vec![
            vec!["d".into(), format!("g.{author}.agent")],
            vec!["agent-type".into(), "dvm".into()],
            vec!["ilp-address".into(), format!("g.{author}.agent")],
            vec!["k".into(), supported_kind.to_string()],
        ],
        content: String::new(),
        signature: "sig".into(),
    };

    // B doesn't support kind 5000; no kind-3 follow records exist anywhere,
    // so the 2-hop phase yields nothing and discovery degrades to 1-hop.
    let store = FakeEventStore::new(vec![cap_record(&a, 5000), cap_record(&b, 6000)]);

    let results = discover_for_kind(&store, &router, None, &self_pubkey, 5000, DiscoveryOptions { extended_hops: true, ..Default::default() })
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pubkey, a);
    assert_eq!(results[0].social_distance, 1);

    // EventStore really was queried — sanity check this isn't vacuously true.
    let filter = agentmesh_core::transport::EventFilter::for_kinds([agentmesh_core::record::kind::CAPABILITY]);
    assert_eq!(store.query_events(&filter).await.unwrap().len(), 2);
}
