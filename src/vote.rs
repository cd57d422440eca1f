//! Vote (kind 6910) author and parser. A vote is an immutable signed record
//! created once per participant; the author must be a listed participant.

use serde::{Deserialize, Serialize};

use crate::errors::{CoordinationError, Pubkey, Result};
use crate::proposal::Proposal;
use crate::record::{kind, limits, marker, tag, SignedRecord};
use crate::transport::{RecordTemplate, Signer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
}

impl VoteChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::Approve => "approve",
            VoteChoice::Reject => "reject",
            VoteChoice::Abstain => "abstain",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "approve" => Ok(VoteChoice::Approve),
            "reject" => Ok(VoteChoice::Reject),
            "abstain" => Ok(VoteChoice::Abstain),
            other => Err(CoordinationError::InvalidRecord(format!("unknown vote value {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Id of this vote's own signed record, not the proposal it refers to.
    pub event_id: String,
    pub proposal_event_id: String,
    pub proposal_id: String,
    pub voter: Pubkey,
    pub vote: VoteChoice,
    pub reason: Option<String>,
    pub rank: Option<Vec<i64>>,
    pub created_at: i64,
}

/// Given `(proposal, vote, reason?, rank?)`, build and sign a vote record.
pub async fn author(
    signer: &dyn Signer,
    proposal_event_id: &str,
    proposal: &Proposal,
    choice: VoteChoice,
    reason: Option<String>,
    rank: Option<Vec<i64>>,
    now: i64,
) -> Result<(SignedRecord, Vote)> {
    let voter = signer.pubkey();
    if !proposal.participants.iter().any(|p| p == &voter) {
        return Err(CoordinationError::NotParticipant { pubkey: voter, proposal_id: proposal.id.clone() });
    }
    if let Some(r) = &reason {
        if r.chars().count() > limits::MAX_VOTE_REASON_CHARS {
            return Err(CoordinationError::InvalidRecord("reason exceeds 500 characters".into()));
        }
    }
    if let Some(r) = &rank {
        if r.len() > limits::MAX_RANK_ENTRIES {
            return Err(CoordinationError::InvalidRecord("rank exceeds 100 entries".into()));
        }
    }

    let mut tags = vec![
        vec![tag::EVENT.into(), proposal_event_id.into(), marker::PROPOSAL.into()],
        vec![tag::D.into(), proposal.id.clone()],
        vec![tag::VOTE.into(), choice.as_str().into()],
    ];
    if let Some(r) = &reason {
        tags.push(vec![tag::REASON.into(), r.clone()]);
    }
    if let Some(r) = &rank {
        let mut t = vec![tag::RANK.to_string()];
        t.extend(r.iter().map(|v| v.to_string()));
        tags.push(t);
    }

    let content = reason.clone().unwrap_or_default();

    let record = signer
        .sign(RecordTemplate {
            author_pubkey: voter.clone(),
            created_at: now,
            kind: kind::VOTE,
            tags,
            content,
        })
        .await?;

    let vote = Vote {
        event_id: record.id.clone(),
        proposal_event_id: proposal_event_id.into(),
        proposal_id: proposal.id.clone(),
        voter,
        vote: choice,
        reason,
        rank,
        created_at: now,
    };

    Ok((record, vote))
}

/// Parse and validate a raw record into a [`Vote`] against `proposal`
/// Verifies the `e/proposal` reference is unique and
/// matches, and that the voter is a listed participant.
pub fn parse(record: &SignedRecord, proposal: &Proposal) -> Result<Vote> {
    if record.kind != kind::VOTE {
        return Err(CoordinationError::InvalidRecord(format!("expected kind {}, got {}", kind::VOTE, record.kind)));
    }

    let proposal_refs: Vec<&Vec<String>> = record
        .tags_named(tag::EVENT)
        .filter(|t| t.get(2).map(String::as_str) == Some(marker::PROPOSAL))
        .collect();
    if proposal_refs.len() != 1 {
        return Err(CoordinationError::InvalidRecord(format!(
            "expected exactly one e/proposal tag, found {}",
            proposal_refs.len()
        )));
    }
    let proposal_event_id = proposal_refs[0]
        .get(1)
        .ok_or_else(|| CoordinationError::InvalidRecord("e tag missing event id".into()))?
        .clone();

    let proposal_d = record
        .first_tag(tag::D)
        .and_then(|t| t.get(1))
        .ok_or_else(|| CoordinationError::InvalidRecord("missing d tag".into()))?;
    if proposal_d != &proposal.id {
        return Err(CoordinationError::ProposalMismatch {
            vote_d: proposal_d.clone(),
            proposal_id: proposal.id.clone(),
        });
    }

    let choice = VoteChoice::parse(
        record
            .first_tag(tag::VOTE)
            .and_then(|t| t.get(1))
            .ok_or_else(|| CoordinationError::InvalidRecord("missing vote tag".into()))?,
    )?;

    let reason = record.first_tag(tag::REASON).and_then(|t| t.get(1).cloned());
    if let Some(r) = &reason {
        if r.chars().count() > limits::MAX_VOTE_REASON_CHARS {
            return Err(CoordinationError::InvalidRecord("reason exceeds 500 characters".into()));
        }
    }

    let rank = match record.first_tag(tag::RANK) {
        Some(t) => {
            let entries: Result<Vec<i64>> = t[1..]
                .iter()
                .map(|v| v.parse::<i64>().map_err(|_| CoordinationError::InvalidRecord(format!("rank entry {v} is not an integer"))))
                .collect();
            let entries = entries?;
            if entries.len() > limits::MAX_RANK_ENTRIES {
                return Err(CoordinationError::InvalidRecord("rank exceeds 100 entries".into()));
            }
            Some(entries)
        }
        None => None,
    };

    let voter = record.author_pubkey.clone();
    if !proposal.participants.iter().any(|p| p == &voter) {
        return Err(CoordinationError::NotParticipant { pubkey: voter, proposal_id: proposal.id.clone() });
    }

    Ok(Vote {
        event_id: record.id.clone(),
        proposal_event_id,
        proposal_id: proposal.id.clone(),
        voter,
        vote: choice,
        reason,
        rank,
        created_at: record.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{self, ProposalAuthorInput, ProposalType};
    use crate::testing::FakeSigner;

    async fn sample_proposal() -> (SignedRecord, Proposal) {
        let coordinator = FakeSigner::new("c".repeat(64));
        let participants = vec!["a".repeat(64), "b".repeat(64)];
        let input = ProposalAuthorInput {
            proposal_type: ProposalType::Consensus,
            participants,
            expires_in_seconds: 3600,
            description: "desc".into(),
            threshold: None,
            quorum: None,
            action: None,
            weights: None,
            stake_required: None,
            coordinator_payment_address: None,
        };
        proposal::author(&coordinator, input, 0).await.unwrap()
    }

    #[tokio::test]
    async fn author_then_parse_round_trips() {
        let (proposal_record, proposal) = sample_proposal().await;
        let voter = FakeSigner::new("a".repeat(64));
        let (record, vote) = author(&voter, &proposal_record.id, &proposal, VoteChoice::Approve, Some("lgtm".into()), None, 10)
            .await
            .unwrap();
        let reparsed = parse(&record, &proposal).unwrap();
        assert_eq!(reparsed.voter, vote.voter);
        assert_eq!(reparsed.vote, VoteChoice::Approve);
        assert_eq!(reparsed.reason.as_deref(), Some("lgtm"));
    }

    #[tokio::test]
    async fn author_rejects_non_participant() {
        let (proposal_record, proposal) = sample_proposal().await;
        let outsider = FakeSigner::new("d".repeat(64));
        let err = author(&outsider, &proposal_record.id, &proposal, VoteChoice::Approve, None, None, 10).await.unwrap_err();
        assert!(matches!(err, CoordinationError::NotParticipant { .. }));
    }

    #[tokio::test]
    async fn parse_rejects_proposal_mismatch() {
        let (proposal_record, proposal) = sample_proposal().await;
        let voter = FakeSigner::new("a".repeat(64));
        let (mut record, _) = author(&voter, &proposal_record.id, &proposal, VoteChoice::Reject, None, None, 10).await.unwrap();
        for t in record.tags.iter_mut() {
            if t.first().map(String::as_str) == Some("d") {
                t[1] = "f".repeat(32);
            }
        }
        let err = parse(&record, &proposal).unwrap_err();
        assert!(matches!(err, CoordinationError::ProposalMismatch { .. }));
    }
}
