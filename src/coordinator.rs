//! Coordinator runtime: owns the mutable per-proposal state (accumulated
//! votes, resolution-once guarantee) on behalf of a proposal's author.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::consensus::{self, Outcome};
use crate::errors::{Pubkey, Result};
use crate::proposal::Proposal;
use crate::result::{self, ResultWithAction};
use crate::transport::Signer;
use crate::vote::Vote;

struct ProposalState {
    proposal_event_id: String,
    proposal: Proposal,
    votes: HashMap<Pubkey, Vote>,
    resolved: bool,
}

/// Owns the coordinator's in-flight proposals. Peers never construct this —
/// they hold read-only replicas of what they observe over the transport.
pub struct Coordinator {
    proposals: Mutex<HashMap<String, ProposalState>>,
}

impl Coordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { proposals: Mutex::new(HashMap::new()) })
    }

    /// Register a freshly authored proposal for tracking.
    pub async fn track(&self, proposal_event_id: String, proposal: Proposal) {
        let mut proposals = self.proposals.lock().await;
        proposals.insert(
            proposal.id.clone(),
            ProposalState { proposal_event_id, proposal, votes: HashMap::new(), resolved: false },
        );
    }

    /// Record an observed, already-validated vote. Enforces "one vote per
    /// participant": first-wins — a second
    /// vote from the same pubkey is rejected as a duplicate rather than
    /// silently overwriting the first.
    pub async fn record_vote(&self, vote: Vote) -> Result<()> {
        let mut proposals = self.proposals.lock().await;
        let state = proposals
            .get_mut(&vote.proposal_id)
            .ok_or_else(|| crate::errors::CoordinationError::Other(format!("unknown proposal {}", vote.proposal_id)))?;
        if state.votes.contains_key(&vote.voter) {
            return Err(crate::errors::CoordinationError::DuplicateVote(vote.voter));
        }
        state.votes.insert(vote.voter.clone(), vote);
        Ok(())
    }

    /// Evaluate the proposal's current votes and, if a terminal outcome is
    /// reached and the proposal has not already been resolved, publish a
    /// result (and any approved action). Returns `None` when the outcome is
    /// `Pending` or the proposal was already resolved, in which case no
    /// result is published — this is how "at most once per proposal" holds.
    pub async fn try_resolve(&self, signer: &dyn Signer, proposal_id: &str, now: i64) -> Result<Option<ResultWithAction>> {
        let mut proposals = self.proposals.lock().await;
        let state = proposals
            .get_mut(proposal_id)
            .ok_or_else(|| crate::errors::CoordinationError::Other(format!("unknown proposal {proposal_id}")))?;

        if state.resolved {
            return Ok(None);
        }

        let outcome = consensus::evaluate(&state.proposal, &state.votes, now)?;
        if outcome == Outcome::Pending {
            return Ok(None);
        }

        let out = result::create_result_with_action(signer, &state.proposal_event_id, &mut state.proposal, &state.votes, outcome, now).await?;
        state.resolved = true;
        Ok(Some(out))
    }

    /// The event ids of votes counted so far, for callers that need to
    /// publish a result independently of [`Self::try_resolve`].
    pub async fn votes_counted(&self, proposal_id: &str) -> HashSet<String> {
        let proposals = self.proposals.lock().await;
        proposals.get(proposal_id).map(|s| s.votes.values().map(|v| v.event_id.clone()).collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{ProposalAuthorInput, ProposalType};
    use crate::testing::FakeSigner;
    use crate::vote::VoteChoice;

    #[tokio::test]
    async fn evaluates_at_most_once_per_proposal() {
        let coordinator = Coordinator::new();
        let signer = FakeSigner::new("c".repeat(64));
        let participants = vec!["a".repeat(64), "b".repeat(64)];
        let input = ProposalAuthorInput {
            proposal_type: ProposalType::Consensus,
            participants: participants.clone(),
            expires_in_seconds: 3600,
            description: "x".into(),
            threshold: None,
            quorum: None,
            action: None,
            weights: None,
            stake_required: None,
            coordinator_payment_address: None,
        };
        let (record, proposal) = crate::proposal::author(&signer, input, 0).await.unwrap();
        coordinator.track(record.id.clone(), proposal.clone()).await;

        for p in &participants {
            let voter = FakeSigner::new(p.clone());
            let (vote_record, vote) = crate::vote::author(&voter, &record.id, &proposal, VoteChoice::Approve, None, None, 1).await.unwrap();
            let _ = vote_record;
            coordinator.record_vote(vote).await.unwrap();
        }

        let first = coordinator.try_resolve(&signer, &proposal.id, 10).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().result.outcome, Outcome::Approved);

        let second = coordinator.try_resolve(&signer, &proposal.id, 20).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn duplicate_vote_from_same_participant_is_rejected() {
        let coordinator = Coordinator::new();
        let signer = FakeSigner::new("c".repeat(64));
        let participants = vec!["a".repeat(64), "b".repeat(64)];
        let input = ProposalAuthorInput {
            proposal_type: ProposalType::Consensus,
            participants,
            expires_in_seconds: 3600,
            description: "x".into(),
            threshold: None,
            quorum: None,
            action: None,
            weights: None,
            stake_required: None,
            coordinator_payment_address: None,
        };
        let (record, proposal) = crate::proposal::author(&signer, input, 0).await.unwrap();
        coordinator.track(record.id.clone(), proposal.clone()).await;

        let voter = FakeSigner::new("a".repeat(64));
        let (_, vote1) = crate::vote::author(&voter, &record.id, &proposal, VoteChoice::Approve, None, None, 1).await.unwrap();
        coordinator.record_vote(vote1).await.unwrap();

        let (_, vote2) = crate::vote::author(&voter, &record.id, &proposal, VoteChoice::Reject, None, None, 2).await.unwrap();
        let err = coordinator.record_vote(vote2).await.unwrap_err();
        assert!(matches!(err, crate::errors::CoordinationError::DuplicateVote(_)));
    }
}
