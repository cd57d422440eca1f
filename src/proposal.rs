//! Proposal (kind 5910) author and parser. A `Proposal` is a plain,
//! content-addressed value built from a validated signed record, not a
//! mutable account.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::{CoordinationError, Pubkey, ProposalId, Result};
use crate::record::{is_valid_pubkey, is_valid_proposal_id, kind, limits, tag};
use crate::record::SignedRecord;
use crate::transport::{RecordTemplate, Signer};

/// Coordination rule a proposal asks to be evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalType {
    Consensus,
    Majority,
    Threshold,
    /// Parses, but has no evaluator — always fails evaluation.
    Ranked,
    /// Parses, but has no evaluator — always fails evaluation.
    Allocation,
}

impl ProposalType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalType::Consensus => "consensus",
            ProposalType::Majority => "majority",
            ProposalType::Threshold => "threshold",
            ProposalType::Ranked => "ranked",
            ProposalType::Allocation => "allocation",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "consensus" => Ok(ProposalType::Consensus),
            "majority" => Ok(ProposalType::Majority),
            "threshold" => Ok(ProposalType::Threshold),
            "ranked" => Ok(ProposalType::Ranked),
            "allocation" => Ok(ProposalType::Allocation),
            other => Err(CoordinationError::InvalidRecord(format!("unknown proposal type {other}"))),
        }
    }

    pub fn is_evaluable(self) -> bool {
        matches!(self, ProposalType::Consensus | ProposalType::Majority | ProposalType::Threshold)
    }
}

/// The action a coordinator promises to emit if a proposal is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: u32,
    pub data: String,
}

/// A parsed, validated Kind-5910 record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub coordinator: Pubkey,
    pub proposal_type: ProposalType,
    pub participants: Vec<Pubkey>,
    pub threshold: Option<u64>,
    pub quorum: Option<u64>,
    pub expires_at: i64,
    pub action: Option<Action>,
    pub weights: Option<HashMap<Pubkey, f64>>,
    pub stake_required: Option<u128>,
    pub escrow_address: Option<String>,
    /// Runtime-only: stakes posted so far. Zeroed by the escrow coordinator
    /// on resolution. Never serialized onto the wire record.
    #[serde(skip)]
    pub stakes: HashMap<Pubkey, u128>,
    pub content: String,
    pub created_at: i64,
}

impl Proposal {
    pub fn escrow_address_for(payment_address: &str, proposal_id: &str) -> String {
        format!("{payment_address}.escrow.{proposal_id}")
    }
}

/// Inputs to [`author`].
pub struct ProposalAuthorInput {
    pub proposal_type: ProposalType,
    pub participants: Vec<Pubkey>,
    pub expires_in_seconds: i64,
    pub description: String,
    pub threshold: Option<u64>,
    pub quorum: Option<u64>,
    pub action: Option<Action>,
    pub weights: Option<HashMap<Pubkey, f64>>,
    pub stake_required: Option<u128>,
    /// The coordinator's own payment address, used to derive the escrow
    /// address when `stake_required` is set.
    pub coordinator_payment_address: Option<String>,
}

fn validate_author_input(input: &ProposalAuthorInput, now: i64) -> Result<()> {
    if input.participants.is_empty() || input.participants.len() > limits::MAX_PARTICIPANTS {
        return Err(CoordinationError::InvalidRecord(format!(
            "participants count {} out of bounds",
            input.participants.len()
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for p in &input.participants {
        if !is_valid_pubkey(p) {
            return Err(CoordinationError::InvalidRecord(format!("invalid participant pubkey {p}")));
        }
        if !seen.insert(p.clone()) {
            return Err(CoordinationError::InvalidRecord(format!("duplicate participant {p}")));
        }
    }
    if let Some(t) = input.threshold {
        if t == 0 || t as usize > input.participants.len() {
            return Err(CoordinationError::InvalidRecord(format!(
                "threshold {t} exceeds participant count {}",
                input.participants.len()
            )));
        }
    }
    if let Some(q) = input.quorum {
        if q == 0 {
            return Err(CoordinationError::InvalidRecord("quorum must be positive".into()));
        }
    }
    if input.expires_in_seconds <= 0 {
        return Err(CoordinationError::InvalidRecord("expires_in_seconds must be positive".into()));
    }
    if input.description.trim().is_empty() {
        return Err(CoordinationError::InvalidRecord("description must be non-empty".into()));
    }
    if let Some(action) = &input.action {
        if action.kind == 0 {
            return Err(CoordinationError::InvalidRecord("action kind must be positive".into()));
        }
        if action.data.len() > limits::MAX_ACTION_DATA_BYTES {
            return Err(CoordinationError::InvalidRecord("action data exceeds 100 KiB".into()));
        }
        serde_json::from_str::<serde_json::Value>(&action.data)
            .map_err(|e| CoordinationError::InvalidRecord(format!("action data is not valid JSON: {e}")))?;
    }
    if let Some(weights) = &input.weights {
        for (pubkey, w) in weights {
            if !is_valid_pubkey(pubkey) {
                return Err(CoordinationError::InvalidRecord(format!("invalid weight pubkey {pubkey}")));
            }
            if *w < 0.0 || *w > limits::MAX_WEIGHT_VALUE {
                return Err(CoordinationError::InvalidRecord(format!("weight {w} out of bounds")));
            }
        }
    }
    if let Some(stake) = input.stake_required {
        if stake == 0 {
            return Err(CoordinationError::InvalidRecord("stake_required must be positive".into()));
        }
        if input.coordinator_payment_address.is_none() {
            return Err(CoordinationError::InvalidRecord(
                "stake_required set without a coordinator payment address".into(),
            ));
        }
    }
    let _ = now;
    Ok(())
}

fn random_proposal_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build, sign, and return a proposal record plus its typed projection.
///
/// `now` is injected (rather than read from the clock) so callers — and
/// tests — control `expires_at` computation deterministically.
pub async fn author(
    signer: &dyn Signer,
    input: ProposalAuthorInput,
    now: i64,
) -> Result<(SignedRecord, Proposal)> {
    validate_author_input(&input, now)?;

    let id = random_proposal_id();
    let expires_at = now + input.expires_in_seconds;
    let coordinator = signer.pubkey();

    let escrow_address = input
        .stake_required
        .map(|_| Proposal::escrow_address_for(input.coordinator_payment_address.as_deref().unwrap_or_default(), &id));

    let mut tags: Vec<Vec<String>> = Vec::new();
    tags.push(vec![tag::D.into(), id.clone()]);
    tags.push(vec![tag::TYPE.into(), input.proposal_type.as_str().into()]);
    for p in &input.participants {
        tags.push(vec![tag::PARTICIPANT.into(), p.clone()]);
    }
    if let Some(t) = input.threshold {
        tags.push(vec![tag::THRESHOLD.into(), t.to_string()]);
    }
    if let Some(q) = input.quorum {
        tags.push(vec![tag::QUORUM.into(), q.to_string()]);
    }
    tags.push(vec![tag::EXPIRES.into(), expires_at.to_string()]);
    if let Some(action) = &input.action {
        tags.push(vec![tag::ACTION.into(), action.kind.to_string(), action.data.clone()]);
    }
    if let Some(weights) = &input.weights {
        for (pubkey, value) in weights {
            tags.push(vec![tag::WEIGHT.into(), pubkey.clone(), value.to_string()]);
        }
    }
    if let Some(stake) = input.stake_required {
        tags.push(vec![tag::STAKE.into(), stake.to_string()]);
    }

    let mut content = input.description.clone();
    if let Some(addr) = &escrow_address {
        content.push_str(&format!("\nEscrow Address: {addr}"));
    }

    let record = signer
        .sign(RecordTemplate {
            author_pubkey: coordinator.clone(),
            created_at: now,
            kind: kind::PROPOSAL,
            tags,
            content: content.clone(),
        })
        .await?;

    let proposal = Proposal {
        id,
        coordinator,
        proposal_type: input.proposal_type,
        participants: input.participants,
        threshold: input.threshold,
        quorum: input.quorum,
        expires_at,
        action: input.action,
        weights: input.weights,
        stake_required: input.stake_required,
        escrow_address,
        stakes: HashMap::new(),
        content,
        created_at: now,
    };

    Ok((record, proposal))
}

/// Parse and validate a raw record into a [`Proposal`].
///
/// Tie-break rule: the first `d`/`type`/`expires` tag wins; `p`/`weight`/
/// `action` tags are collected in document order.
pub fn parse(record: &SignedRecord, now: i64) -> Result<Proposal> {
    if record.kind != kind::PROPOSAL {
        return Err(CoordinationError::InvalidRecord(format!(
            "expected kind {}, got {}",
            kind::PROPOSAL,
            record.kind
        )));
    }

    let id = record
        .first_tag(tag::D)
        .and_then(|t| t.get(1))
        .ok_or_else(|| CoordinationError::InvalidRecord("missing d tag".into()))?
        .clone();
    if !is_valid_proposal_id(&id) {
        return Err(CoordinationError::InvalidRecord(format!("invalid proposal id {id}")));
    }

    let proposal_type = ProposalType::parse(
        record
            .first_tag(tag::TYPE)
            .and_then(|t| t.get(1))
            .ok_or_else(|| CoordinationError::InvalidRecord("missing type tag".into()))?,
    )?;

    let participants: Vec<Pubkey> = record.tags_named(tag::PARTICIPANT).filter_map(|t| t.get(1).cloned()).collect();
    if participants.is_empty() || participants.len() > limits::MAX_PARTICIPANTS {
        return Err(CoordinationError::InvalidRecord(format!(
            "participants count {} out of bounds",
            participants.len()
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for p in &participants {
        if !is_valid_pubkey(p) {
            return Err(CoordinationError::InvalidRecord(format!("invalid participant pubkey {p}")));
        }
        if !seen.insert(p.clone()) {
            return Err(CoordinationError::InvalidRecord(format!("duplicate participant {p}")));
        }
    }

    let threshold = record
        .first_tag(tag::THRESHOLD)
        .and_then(|t| t.get(1))
        .map(|v| v.parse::<u64>())
        .transpose()
        .map_err(|_| CoordinationError::InvalidRecord("threshold is not a valid integer".into()))?;
    if let Some(t) = threshold {
        if t == 0 || t as usize > participants.len() {
            return Err(CoordinationError::InvalidRecord(format!(
                "threshold {t} exceeds participant count {}",
                participants.len()
            )));
        }
    }

    let quorum = record
        .first_tag(tag::QUORUM)
        .and_then(|t| t.get(1))
        .map(|v| v.parse::<u64>())
        .transpose()
        .map_err(|_| CoordinationError::InvalidRecord("quorum is not a valid integer".into()))?;

    let expires_at: i64 = record
        .first_tag(tag::EXPIRES)
        .and_then(|t| t.get(1))
        .ok_or_else(|| CoordinationError::InvalidRecord("missing expires tag".into()))?
        .parse()
        .map_err(|_| CoordinationError::InvalidRecord("expires is not a valid integer".into()))?;
    if expires_at <= now {
        return Err(CoordinationError::ExpiredProposal { proposal_id: id, expires_at, now });
    }

    let action = match record.first_tag(tag::ACTION) {
        Some(t) => {
            let action_kind: u32 = t
                .get(1)
                .ok_or_else(|| CoordinationError::InvalidRecord("action tag missing kind".into()))?
                .parse()
                .map_err(|_| CoordinationError::InvalidRecord("action kind is not a valid integer".into()))?;
            if action_kind == 0 {
                return Err(CoordinationError::InvalidRecord("action kind must be positive".into()));
            }
            let data = t.get(2).ok_or_else(|| CoordinationError::InvalidRecord("action tag missing data".into()))?.clone();
            if data.len() > limits::MAX_ACTION_DATA_BYTES {
                return Err(CoordinationError::InvalidRecord("action data exceeds 100 KiB".into()));
            }
            Some(Action { kind: action_kind, data })
        }
        None => None,
    };

    let mut weights_map = HashMap::new();
    for t in record.tags_named(tag::WEIGHT) {
        let pubkey = t.get(1).ok_or_else(|| CoordinationError::InvalidRecord("weight tag missing pubkey".into()))?;
        let value: f64 = t
            .get(2)
            .ok_or_else(|| CoordinationError::InvalidRecord("weight tag missing value".into()))?
            .parse()
            .map_err(|_| CoordinationError::InvalidRecord("weight value is not numeric".into()))?;
        if value < 0.0 || value > limits::MAX_WEIGHT_VALUE {
            return Err(CoordinationError::InvalidRecord(format!("weight {value} out of bounds")));
        }
        weights_map.insert(pubkey.clone(), value);
    }
    let weights = if weights_map.is_empty() { None } else { Some(weights_map) };

    let stake_required = record
        .first_tag(tag::STAKE)
        .and_then(|t| t.get(1))
        .map(|v| v.parse::<u128>())
        .transpose()
        .map_err(|_| CoordinationError::InvalidRecord("stake is not a valid integer".into()))?;

    let escrow_address = record
        .content
        .lines()
        .find_map(|line| line.strip_prefix("Escrow Address: "))
        .map(str::to_string);

    if stake_required.is_some() && escrow_address.is_none() {
        return Err(CoordinationError::InvalidRecord(
            "stake_required set but no escrow address present in content".into(),
        ));
    }

    Ok(Proposal {
        id,
        coordinator: record.author_pubkey.clone(),
        proposal_type,
        participants,
        threshold,
        quorum,
        expires_at,
        action,
        weights,
        stake_required,
        escrow_address,
        stakes: HashMap::new(),
        content: record.content.clone(),
        created_at: record.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSigner;

    fn participants(n: usize) -> Vec<Pubkey> {
        (0..n).map(|i| format!("{:064x}", i + 1)).collect()
    }

    #[tokio::test]
    async fn author_then_parse_round_trips() {
        let signer = FakeSigner::new("c".repeat(64));
        let input = ProposalAuthorInput {
            proposal_type: ProposalType::Threshold,
            participants: participants(3),
            expires_in_seconds: 3600,
            description: "ship the release".into(),
            threshold: Some(2),
            quorum: None,
            action: None,
            weights: None,
            stake_required: None,
            coordinator_payment_address: None,
        };
        let (record, proposal) = author(&signer, input, 1_000).await.unwrap();
        let reparsed = parse(&record, 1_000).unwrap();
        assert_eq!(reparsed.id, proposal.id);
        assert_eq!(reparsed.participants, proposal.participants);
        assert_eq!(reparsed.threshold, proposal.threshold);
        assert_eq!(reparsed.expires_at, 1_000 + 3600);
    }

    #[tokio::test]
    async fn author_rejects_threshold_above_participant_count() {
        let signer = FakeSigner::new("c".repeat(64));
        let input = ProposalAuthorInput {
            proposal_type: ProposalType::Threshold,
            participants: participants(2),
            expires_in_seconds: 60,
            description: "x".into(),
            threshold: Some(5),
            quorum: None,
            action: None,
            weights: None,
            stake_required: None,
            coordinator_payment_address: None,
        };
        assert!(author(&signer, input, 0).await.is_err());
    }

    #[tokio::test]
    async fn stake_required_appends_escrow_trailer() {
        let signer = FakeSigner::new("c".repeat(64));
        let input = ProposalAuthorInput {
            proposal_type: ProposalType::Consensus,
            participants: participants(2),
            expires_in_seconds: 60,
            description: "x".into(),
            threshold: None,
            quorum: None,
            action: None,
            weights: None,
            stake_required: Some(500),
            coordinator_payment_address: Some("g.alice.agent".into()),
        };
        let (record, proposal) = author(&signer, input, 0).await.unwrap();
        assert!(record.content.contains("Escrow Address:"));
        assert_eq!(proposal.escrow_address, Some(format!("g.alice.agent.escrow.{}", proposal.id)));
    }

    #[test]
    fn parse_rejects_expired_proposal() {
        let record = SignedRecord {
            id: "rid".into(),
            author_pubkey: "c".repeat(64),
            created_at: 0,
            kind: kind::PROPOSAL,
            tags: vec![
                vec!["d".into(), "0".repeat(32)],
                vec!["type".into(), "consensus".into()],
                vec!["p".into(), "a".repeat(64)],
                vec!["expires".into(), "100".into()],
            ],
            content: "desc".into(),
            signature: "sig".into(),
        };
        let err = parse(&record, 200).unwrap_err();
        assert!(matches!(err, CoordinationError::ExpiredProposal { .. }));
    }
}
