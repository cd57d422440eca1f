//! Result (kind 7910) aggregator. Creating the result record always happens
//! first, so it is observable even when escrow resolution or action
//! emission fails.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::consensus::Outcome;
use crate::errors::{Pubkey, Result as CoreResult};
use crate::escrow::{self, EscrowResolution};
use crate::proposal::Proposal;
use crate::record::{kind, marker, tag, SignedRecord};
use crate::transport::{RecordTemplate, Signer};
use crate::vote::{Vote, VoteChoice};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub proposal_event_id: String,
    pub proposal_id: String,
    pub outcome: Outcome,
    pub tally: (u64, u64, u64),
    pub participation: (u64, u64),
    pub counted_vote_event_ids: Vec<String>,
    pub content: String,
    pub created_at: i64,
}

fn outcome_str(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Approved => "approved",
        Outcome::Rejected => "rejected",
        Outcome::Expired => "expired",
        Outcome::Inconclusive => "inconclusive",
        Outcome::Pending => "pending",
    }
}

/// Build, sign, and return a result record for `outcome`.
/// `votes` maps participant pubkey to their counted vote.
pub async fn author(
    signer: &dyn Signer,
    proposal_event_id: &str,
    proposal: &Proposal,
    votes: &HashMap<Pubkey, Vote>,
    outcome: Outcome,
    now: i64,
) -> CoreResult<(SignedRecord, CoordinationResult)> {
    let mut approve = 0u64;
    let mut reject = 0u64;
    let mut abstain = 0u64;
    let mut counted_ids = Vec::new();
    for pubkey in &proposal.participants {
        if let Some(v) = votes.get(pubkey) {
            match v.vote {
                VoteChoice::Approve => approve += 1,
                VoteChoice::Reject => reject += 1,
                VoteChoice::Abstain => abstain += 1,
            }
            counted_ids.push(v.event_id.clone());
        }
    }
    let voted = votes.len() as u64;
    let total = proposal.participants.len() as u64;

    let content = format!("Proposal {} with {}/{}/{} votes.", outcome_str(outcome), approve, reject, abstain);

    let mut tags = vec![
        vec![tag::EVENT.into(), proposal_event_id.into(), marker::PROPOSAL.into()],
        vec![tag::D.into(), proposal.id.clone()],
        vec![tag::OUTCOME.into(), outcome_str(outcome).into()],
        vec![tag::VOTES.into(), approve.to_string(), reject.to_string(), abstain.to_string()],
        vec![tag::PARTICIPANTS.into(), voted.to_string(), total.to_string()],
    ];
    for pubkey in &proposal.participants {
        if let Some(v) = votes.get(pubkey) {
            tags.push(vec![tag::EVENT.into(), v.event_id.clone(), marker::VOTE.into()]);
        }
    }

    let record = signer
        .sign(RecordTemplate {
            author_pubkey: signer.pubkey(),
            created_at: now,
            kind: kind::RESULT,
            tags,
            content: content.clone(),
        })
        .await?;

    Ok((
        record,
        CoordinationResult {
            proposal_event_id: proposal_event_id.into(),
            proposal_id: proposal.id.clone(),
            outcome,
            tally: (approve, reject, abstain),
            participation: (voted, total),
            counted_vote_event_ids: counted_ids,
            content,
            created_at: now,
        },
    ))
}

/// The outcome of [`create_result_with_action`]: the always-published result,
/// plus whatever escrow/action side effects actually happened.
pub struct ResultWithAction {
    pub result_record: SignedRecord,
    pub result: CoordinationResult,
    pub escrow_resolution: Option<EscrowResolution>,
    pub action_record: Option<SignedRecord>,
}

/// Spec.md §4.5's combined entry point:
/// 1. Always create the result first.
/// 2. If stake is required, resolve escrow (errors logged, never propagated).
/// 3. If approved and an action is set, emit it iff `action.data` is valid JSON.
pub async fn create_result_with_action(
    signer: &dyn Signer,
    proposal_event_id: &str,
    proposal: &mut Proposal,
    votes: &HashMap<Pubkey, Vote>,
    outcome: Outcome,
    now: i64,
) -> CoreResult<ResultWithAction> {
    let (result_record, result) = author(signer, proposal_event_id, proposal, votes, outcome, now).await?;

    let escrow_resolution = if proposal.stake_required.is_some() {
        escrow::resolve(proposal, outcome)
    } else {
        None
    };

    let action_record = if outcome == Outcome::Approved {
        if let Some(action) = &proposal.action {
            match serde_json::from_str::<serde_json::Value>(&action.data) {
                Ok(value) => {
                    let reserialized = value.to_string();
                    match signer
                        .sign(RecordTemplate {
                            author_pubkey: signer.pubkey(),
                            created_at: now,
                            kind: action.kind,
                            tags: Vec::new(),
                            content: reserialized,
                        })
                        .await
                    {
                        Ok(record) => Some(record),
                        Err(e) => {
                            tracing::error!(error = %e, proposal_id = %proposal.id, "failed to sign approved action");
                            None
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, proposal_id = %proposal.id, "approved action data is not valid JSON, skipping");
                    None
                }
            }
        } else {
            None
        }
    } else {
        None
    };

    Ok(ResultWithAction { result_record, result, escrow_resolution, action_record })
}
