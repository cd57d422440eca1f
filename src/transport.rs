//! External collaborator boundaries: the event store, the signer/transport,
//! and the follow-graph router. The core never reaches past these three
//! traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::errors::Result;
use crate::record::SignedRecord;

/// A query against the event store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub kinds: HashSet<u32>,
    pub authors: Option<HashSet<String>>,
    pub tag_filters: HashMap<String, HashSet<String>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn for_kinds(kinds: impl IntoIterator<Item = u32>) -> Self {
        Self { kinds: kinds.into_iter().collect(), ..Default::default() }
    }
}

/// The append-only signed-event store. Implemented by the transport layer; consumed
/// only through this trait.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn query_events(&self, filter: &EventFilter) -> Result<Vec<SignedRecord>>;
    async fn store_event(&self, record: SignedRecord) -> Result<()>;
}

/// A record template prior to signing: everything the signer needs to
/// compute `id` and `signature` over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTemplate {
    pub author_pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Signing and verification, supplied by the transport layer. The core
/// never invents its own signature scheme.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The pubkey this signer signs on behalf of.
    fn pubkey(&self) -> String;
    async fn sign(&self, template: RecordTemplate) -> Result<SignedRecord>;
    async fn verify(&self, record: &SignedRecord) -> Result<bool>;
}

/// One entry in the follow graph, as returned by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub pubkey: String,
    pub payment_address: String,
    pub nickname: Option<String>,
    pub relay_hint: Option<String>,
    pub added_at: i64,
}

/// The social follow graph. Implemented by the transport layer; consumed only
/// through this trait by social discovery (§4.8).
#[async_trait]
pub trait FollowGraphRouter: Send + Sync {
    async fn list_follows(&self) -> Result<Vec<Follow>>;
    async fn lookup_by_pubkey(&self, pubkey: &str) -> Result<Option<Follow>>;
}
