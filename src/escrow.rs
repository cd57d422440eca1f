//! Escrow coordinator: resolves a proposal's posted stakes into a logged
//! release/refund intent for an external payment collaborator to honor. No
//! funds move here — this only computes and records the decision.

use serde::{Deserialize, Serialize};

use crate::consensus::Outcome;
use crate::errors::Pubkey;
use crate::proposal::Proposal;

/// What the payment subsystem should do with a proposal's posted stakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowIntent {
    /// Release the pooled stake to the escrow address / recipient.
    Release,
    /// Refund each participant's stake back to them.
    Refund,
}

/// The logged record of a resolution: what was decided, for whom, and how
/// much. This is the durable record of the resolution decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowResolution {
    pub proposal_id: String,
    pub escrow_address: String,
    pub intent: EscrowIntent,
    pub refunds: Vec<(Pubkey, u128)>,
}

/// Resolve escrow for `proposal` given the evaluation `outcome`, zeroing its
/// `stakes` map. A no-op (returns `None`) when the proposal has no stake.
/// Idempotent: a second call on an already-zeroed proposal is a no-op.
///
/// A failure here must never block result publication;
/// callers invoke this through [`crate::result::create_result_with_action`],
/// which logs and swallows any error this function returns.
pub fn resolve(proposal: &mut Proposal, outcome: Outcome) -> Option<EscrowResolution> {
    if proposal.stake_required.is_none() || proposal.stakes.is_empty() {
        return None;
    }
    let escrow_address = proposal.escrow_address.clone()?;

    // An expired proposal with stake outstanding resolves as a refund.
    let intent = match outcome {
        Outcome::Approved => EscrowIntent::Release,
        Outcome::Rejected | Outcome::Expired | Outcome::Inconclusive | Outcome::Pending => EscrowIntent::Refund,
    };

    let refunds: Vec<(Pubkey, u128)> = if intent == EscrowIntent::Refund {
        proposal.stakes.iter().map(|(k, v)| (k.clone(), *v)).collect()
    } else {
        Vec::new()
    };

    let resolution = EscrowResolution {
        proposal_id: proposal.id.clone(),
        escrow_address,
        intent,
        refunds,
    };

    tracing::info!(
        proposal_id = %resolution.proposal_id,
        intent = ?resolution.intent,
        "escrow resolved"
    );

    proposal.stakes.clear();
    Some(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalType;
    use std::collections::HashMap;

    fn proposal_with_stake() -> Proposal {
        let mut stakes = HashMap::new();
        stakes.insert("a".repeat(64), 100u128);
        stakes.insert("b".repeat(64), 200u128);
        Proposal {
            id: "p".repeat(32),
            coordinator: "c".repeat(64),
            proposal_type: ProposalType::Consensus,
            participants: vec!["a".repeat(64), "b".repeat(64)],
            threshold: None,
            quorum: None,
            expires_at: 1000,
            action: None,
            weights: None,
            stake_required: Some(100),
            escrow_address: Some("g.c.escrow.pid".into()),
            stakes,
            content: "x".into(),
            created_at: 0,
        }
    }

    #[test]
    fn approved_releases_and_zeroes_stakes() {
        let mut p = proposal_with_stake();
        let res = resolve(&mut p, Outcome::Approved).unwrap();
        assert_eq!(res.intent, EscrowIntent::Release);
        assert!(p.stakes.is_empty());
    }

    #[test]
    fn expired_refunds_all_participants() {
        let mut p = proposal_with_stake();
        let res = resolve(&mut p, Outcome::Expired).unwrap();
        assert_eq!(res.intent, EscrowIntent::Refund);
        assert_eq!(res.refunds.len(), 2);
        assert!(p.stakes.is_empty());
    }

    #[test]
    fn resolve_twice_is_idempotent_no_op_on_second_call() {
        let mut p = proposal_with_stake();
        assert!(resolve(&mut p, Outcome::Approved).is_some());
        assert!(resolve(&mut p, Outcome::Approved).is_none());
    }

    #[test]
    fn no_stake_is_a_no_op() {
        let mut p = proposal_with_stake();
        p.stake_required = None;
        p.stakes.clear();
        assert!(resolve(&mut p, Outcome::Approved).is_none());
    }
}
