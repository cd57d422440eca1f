//! In-memory fakes for the three external collaborators, used by this
//! crate's own tests: minimal stand-ins for dependencies this crate never
//! implements itself.
//!
//! Gated behind `cfg(any(test, feature = "test-util"))` — these are test
//! harness code, not production transports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::cache::Clock;
use crate::errors::Result;
use crate::record::SignedRecord;
use crate::transport::{EventFilter, EventStore, Follow, FollowGraphRouter, RecordTemplate, Signer};

pub struct FakeEventStore {
    records: StdMutex<Vec<SignedRecord>>,
}

impl FakeEventStore {
    pub fn new(records: Vec<SignedRecord>) -> Self {
        Self { records: StdMutex::new(records) }
    }
}

#[async_trait]
impl EventStore for FakeEventStore {
    async fn query_events(&self, filter: &EventFilter) -> Result<Vec<SignedRecord>> {
        let records = self.records.lock().unwrap();
        let mut matched: Vec<SignedRecord> = records
            .iter()
            .filter(|r| filter.kinds.is_empty() || filter.kinds.contains(&r.kind))
            .filter(|r| filter.authors.as_ref().map(|a| a.contains(&r.author_pubkey)).unwrap_or(true))
            .filter(|r| {
                filter.tag_filters.iter().all(|(name, values)| r.tags_named(name).any(|t| t.get(1).map(|v| values.contains(v)).unwrap_or(false)))
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn store_event(&self, record: SignedRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

pub struct FakeSigner {
    pubkey: String,
    seq: AtomicU64,
}

impl FakeSigner {
    pub fn new(pubkey: String) -> Self {
        Self { pubkey, seq: AtomicU64::new(0) }
    }
}

#[async_trait]
impl Signer for FakeSigner {
    fn pubkey(&self) -> String {
        self.pubkey.clone()
    }

    async fn sign(&self, template: RecordTemplate) -> Result<SignedRecord> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(template.author_pubkey.as_bytes());
        hasher.update(template.created_at.to_le_bytes());
        hasher.update(template.kind.to_le_bytes());
        hasher.update(template.content.as_bytes());
        hasher.update(seq.to_le_bytes());
        let id = hex::encode(hasher.finalize());
        Ok(SignedRecord {
            id,
            author_pubkey: template.author_pubkey,
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            signature: "fake-signature".into(),
        })
    }

    async fn verify(&self, record: &SignedRecord) -> Result<bool> {
        Ok(record.signature == "fake-signature")
    }
}

pub struct FakeRouter {
    follows: Vec<Follow>,
}

impl FakeRouter {
    pub fn new(follows: Vec<Follow>) -> Self {
        Self { follows }
    }
}

#[async_trait]
impl FollowGraphRouter for FakeRouter {
    async fn list_follows(&self) -> Result<Vec<Follow>> {
        Ok(self.follows.clone())
    }

    async fn lookup_by_pubkey(&self, pubkey: &str) -> Result<Option<Follow>> {
        Ok(self.follows.iter().find(|f| f.pubkey == pubkey).cloned())
    }
}

/// A manually-advanced clock for deterministic TTL/eviction tests.
pub struct FixedClock {
    now: Arc<AtomicU64>,
}

impl FixedClock {
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
