//! Consensus evaluator. Stateless, total (never raises except
//! [`CoordinationError::UnsupportedCoordinationType`]): checks quorum before
//! any outcome, then dispatches on [`ProposalType`] with an additional
//! weighted overlay.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CoordinationError, Pubkey, Result};
use crate::proposal::Proposal;
use crate::vote::{Vote, VoteChoice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Approved,
    Rejected,
    Expired,
    Inconclusive,
    Pending,
}

struct Tally {
    approve: u64,
    reject: u64,
    abstain: u64,
}

fn tally(proposal: &Proposal, votes: &HashMap<Pubkey, Vote>) -> Tally {
    let mut t = Tally { approve: 0, reject: 0, abstain: 0 };
    for pubkey in &proposal.participants {
        if let Some(v) = votes.get(pubkey) {
            match v.vote {
                VoteChoice::Approve => t.approve += 1,
                VoteChoice::Reject => t.reject += 1,
                VoteChoice::Abstain => t.abstain += 1,
            }
        }
    }
    t
}

/// Evaluate `proposal` against `votes` (one vote per participant, keyed by
/// voter pubkey) at time `now`.
pub fn evaluate(proposal: &Proposal, votes: &HashMap<Pubkey, Vote>, now: i64) -> Result<Outcome> {
    if !proposal.proposal_type.is_evaluable() {
        return Err(CoordinationError::UnsupportedCoordinationType(proposal.proposal_type));
    }

    let expired = now > proposal.expires_at;

    if let Some(quorum) = proposal.quorum {
        if (votes.len() as u64) < quorum {
            return Ok(if expired { Outcome::Inconclusive } else { Outcome::Pending });
        }
    }

    if proposal.weights.is_some() {
        return Ok(evaluate_weighted(proposal, votes, expired));
    }

    let n = proposal.participants.len() as u64;
    let t = tally(proposal, votes);
    let voted = votes.len() as u64;

    match proposal.proposal_type {
        crate::proposal::ProposalType::Consensus => {
            if t.approve == n {
                Ok(Outcome::Approved)
            } else if t.reject > 0 {
                Ok(Outcome::Rejected)
            } else if voted < n && !expired {
                Ok(Outcome::Pending)
            } else {
                Ok(Outcome::Inconclusive)
            }
        }
        crate::proposal::ProposalType::Majority => {
            let m = n / 2 + 1;
            if t.approve >= m {
                Ok(Outcome::Approved)
            } else if t.reject >= m {
                Ok(Outcome::Rejected)
            } else if voted == n {
                Ok(Outcome::Inconclusive)
            } else if expired {
                Ok(Outcome::Inconclusive)
            } else {
                Ok(Outcome::Pending)
            }
        }
        crate::proposal::ProposalType::Threshold => {
            let threshold = proposal.threshold.unwrap_or(n / 2 + 1);
            if t.approve >= threshold {
                Ok(Outcome::Approved)
            } else if t.approve + (n - voted) < threshold {
                Ok(Outcome::Rejected)
            } else {
                Ok(Outcome::Pending)
            }
        }
        crate::proposal::ProposalType::Ranked | crate::proposal::ProposalType::Allocation => {
            Err(CoordinationError::UnsupportedCoordinationType(proposal.proposal_type))
        }
    }
}

/// Weight of `pubkey`: missing entries default to 1,
/// non-positive entries clamp to 1 with a warning.
fn weight_of(weights: &HashMap<Pubkey, f64>, pubkey: &str) -> f64 {
    match weights.get(pubkey) {
        Some(w) if *w > 0.0 => *w,
        Some(w) => {
            tracing::warn!(pubkey, weight = w, "non-positive weight clamped to 1");
            1.0
        }
        None => 1.0,
    }
}

fn evaluate_weighted(proposal: &Proposal, votes: &HashMap<Pubkey, Vote>, expired: bool) -> Outcome {
    let weights = proposal.weights.as_ref().expect("weighted path requires weights");
    let total_weight: f64 = proposal.participants.iter().map(|p| weight_of(weights, p)).sum();

    let mut approve_weight = 0.0;
    let mut reject_weight = 0.0;
    for pubkey in &proposal.participants {
        if let Some(v) = votes.get(pubkey) {
            let w = weight_of(weights, pubkey);
            match v.vote {
                VoteChoice::Approve => approve_weight += w,
                VoteChoice::Reject => reject_weight += w,
                VoteChoice::Abstain => {}
            }
        }
    }

    let effective_threshold = match proposal.threshold {
        Some(t) => (t as f64 / proposal.participants.len() as f64) * total_weight,
        None => total_weight / 2.0 + 1.0,
    };

    if approve_weight >= effective_threshold {
        Outcome::Approved
    } else if reject_weight > total_weight - effective_threshold {
        Outcome::Rejected
    } else if votes.len() == proposal.participants.len() {
        Outcome::Inconclusive
    } else if expired {
        Outcome::Inconclusive
    } else {
        Outcome::Pending
    }
}
