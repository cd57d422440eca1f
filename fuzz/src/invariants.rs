//! Protocol invariant checking for fuzz testing.

use std::collections::HashMap;

use agentmesh_core::consensus::Outcome;
use agentmesh_core::errors::Pubkey;
use agentmesh_core::proposal::ProposalType;
use agentmesh_core::vote::Vote;

/// Consensus evaluator invariant results.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusInvariantResult {
    Valid,
    /// A terminal outcome (anything but `Pending`) was reached while the
    /// configured quorum had not yet been met.
    TerminalWithoutQuorum { votes: usize, quorum: u64 },
    /// `Approved` and `Rejected` can never both hold for the same vote set —
    /// this checks the evaluator never returns an outcome inconsistent with
    /// a hand-computed unweighted tally for non-weighted proposals.
    ApprovalRejectionMismatch { outcome: Outcome, approve: u64, reject: u64, n: u64 },
    /// `Pending` was returned after the proposal's expiry — expired
    /// proposals must resolve to a terminal outcome. Does not apply to
    /// `Threshold`, which stays `Pending` past expiry if the remaining
    /// unvoted participants could still reach the threshold.
    PendingAfterExpiry { now: i64, expires_at: i64 },
}

impl ConsensusInvariantResult {
    pub fn is_violation(&self) -> bool {
        !matches!(self, ConsensusInvariantResult::Valid)
    }
}

/// Re-derive the unweighted tally directly from `votes`/`participants`,
/// independent of the evaluator, to cross-check its outcome.
fn unweighted_tally(participants: &[Pubkey], votes: &HashMap<Pubkey, Vote>) -> (u64, u64) {
    let mut approve = 0u64;
    let mut reject = 0u64;
    for p in participants {
        if let Some(v) = votes.get(p) {
            match v.vote {
                agentmesh_core::vote::VoteChoice::Approve => approve += 1,
                agentmesh_core::vote::VoteChoice::Reject => reject += 1,
                agentmesh_core::vote::VoteChoice::Abstain => {}
            }
        }
    }
    (approve, reject)
}

/// Check the evaluator's invariants for a single evaluation.
pub fn check_consensus_invariants(
    participants: &[Pubkey],
    votes: &HashMap<Pubkey, Vote>,
    quorum: Option<u64>,
    weighted: bool,
    proposal_type: ProposalType,
    now: i64,
    expires_at: i64,
    outcome: Outcome,
) -> ConsensusInvariantResult {
    if let Some(q) = quorum {
        if (votes.len() as u64) < q && outcome != Outcome::Pending && outcome != Outcome::Inconclusive {
            return ConsensusInvariantResult::TerminalWithoutQuorum { votes: votes.len(), quorum: q };
        }
    }

    if now > expires_at && outcome == Outcome::Pending && proposal_type != ProposalType::Threshold {
        return ConsensusInvariantResult::PendingAfterExpiry { now, expires_at };
    }

    if !weighted {
        let (approve, reject) = unweighted_tally(participants, votes);
        let n = participants.len() as u64;
        if outcome == Outcome::Approved && approve == 0 {
            return ConsensusInvariantResult::ApprovalRejectionMismatch { outcome, approve, reject, n };
        }
    }

    ConsensusInvariantResult::Valid
}

/// Cache invariant results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheInvariantResult {
    Valid,
    SizeExceedsMax { size: usize, max: usize },
}

pub fn check_cache_size_invariant(size: usize, max_entries: usize) -> CacheInvariantResult {
    if size > max_entries {
        CacheInvariantResult::SizeExceedsMax { size, max: max_entries }
    } else {
        CacheInvariantResult::Valid
    }
}
