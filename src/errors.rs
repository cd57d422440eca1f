//! Error taxonomy for the coordination and discovery core.

use thiserror::Error;

/// A pubkey, 64 lowercase hex characters.
pub type Pubkey = String;
/// A proposal id, 32 hex characters (the `d` tag).
pub type ProposalId = String;

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("proposal {proposal_id} expired at {expires_at}, now is {now}")]
    ExpiredProposal {
        proposal_id: ProposalId,
        expires_at: i64,
        now: i64,
    },

    #[error("pubkey {pubkey} is not a participant of proposal {proposal_id}")]
    NotParticipant {
        pubkey: Pubkey,
        proposal_id: ProposalId,
    },

    #[error("vote references proposal {vote_d} but expected {proposal_id}")]
    ProposalMismatch {
        vote_d: ProposalId,
        proposal_id: ProposalId,
    },

    #[error("duplicate vote from {0}")]
    DuplicateVote(Pubkey),

    #[error("coordination type {0:?} is not supported for evaluation")]
    UnsupportedCoordinationType(crate::proposal::ProposalType),

    #[error("no capability record found for {0}")]
    CapabilityMissing(Pubkey),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoordinationError>;
