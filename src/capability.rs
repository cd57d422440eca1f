//! Capability record (kind 31990) and the query service: advertises what an
//! agent can do, at what price, and with what capacity, as a replaceable
//! signed record keyed by `(author, d)`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::{Pubkey, Result};
use crate::record::{kind, tag, SignedRecord};
use crate::transport::{EventFilter, EventStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentType {
    Dvm,
    Assistant,
    Specialist,
    Coordinator,
    Relay,
}

impl AgentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dvm" => Some(AgentType::Dvm),
            "assistant" => Some(AgentType::Assistant),
            "specialist" => Some(AgentType::Specialist),
            "coordinator" => Some(AgentType::Coordinator),
            "relay" => Some(AgentType::Relay),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Dvm => "dvm",
            AgentType::Assistant => "assistant",
            AgentType::Specialist => "specialist",
            AgentType::Coordinator => "coordinator",
            AgentType::Relay => "relay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Msat,
    Sat,
    Usd,
}

impl Currency {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "msat" => Some(Currency::Msat),
            "sat" => Some(Currency::Sat),
            "usd" => Some(Currency::Usd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: u128,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub max_concurrent: u32,
    pub queue_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub author: Pubkey,
    pub identifier: String,
    pub supported_kinds: HashSet<u32>,
    pub supported_nips: HashSet<String>,
    pub agent_type: AgentType,
    pub payment_address: String,
    pub pricing: HashMap<u32, Price>,
    pub capacity: Option<Capacity>,
    pub model: Option<String>,
    pub skills: Option<HashSet<String>>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// Parse a Kind-31990 record into a [`Capability`], failing on any
/// malformed required field.
pub fn parse(record: &SignedRecord) -> Result<Capability> {
    use crate::errors::CoordinationError;

    if record.kind != kind::CAPABILITY {
        return Err(CoordinationError::InvalidRecord(format!("expected kind {}, got {}", kind::CAPABILITY, record.kind)));
    }
    let identifier = record
        .first_tag(tag::D)
        .and_then(|t| t.get(1))
        .ok_or_else(|| CoordinationError::InvalidRecord("missing d tag".into()))?;
    if identifier.is_empty() {
        return Err(CoordinationError::InvalidRecord("identifier must be non-empty".into()));
    }

    let supported_kinds: Result<HashSet<u32>> = record
        .tags_named(tag::KIND)
        .filter_map(|t| t.get(1))
        .map(|v| v.parse::<u32>().map_err(|_| CoordinationError::InvalidRecord(format!("invalid kind {v}"))))
        .collect();
    let supported_kinds = supported_kinds?;

    let supported_nips: HashSet<String> = record.tags_named(tag::NIP).filter_map(|t| t.get(1).cloned()).collect();

    let agent_type = AgentType::parse(
        record
            .first_tag(tag::AGENT_TYPE)
            .and_then(|t| t.get(1))
            .ok_or_else(|| CoordinationError::InvalidRecord("missing agent-type tag".into()))?,
    )
    .ok_or_else(|| CoordinationError::InvalidRecord("unknown agent-type".into()))?;

    let payment_address = record
        .first_tag(tag::ILP_ADDRESS)
        .and_then(|t| t.get(1))
        .ok_or_else(|| CoordinationError::InvalidRecord("missing ilp-address tag".into()))?
        .clone();
    if payment_address.split('.').any(str::is_empty) {
        return Err(CoordinationError::InvalidRecord("payment address segments must be non-empty".into()));
    }

    let mut pricing = HashMap::new();
    for t in record.tags_named(tag::PRICING) {
        let k: u32 = t.get(1).ok_or_else(|| CoordinationError::InvalidRecord("pricing tag missing kind".into()))?.parse().map_err(|_| CoordinationError::InvalidRecord("invalid pricing kind".into()))?;
        let amount: u128 = t.get(2).ok_or_else(|| CoordinationError::InvalidRecord("pricing tag missing amount".into()))?.parse().map_err(|_| CoordinationError::InvalidRecord("invalid pricing amount".into()))?;
        let currency = Currency::parse(t.get(3).ok_or_else(|| CoordinationError::InvalidRecord("pricing tag missing currency".into()))?)
            .ok_or_else(|| CoordinationError::InvalidRecord("unknown currency".into()))?;
        pricing.insert(k, Price { amount, currency });
    }

    let capacity = match record.first_tag(tag::CAPACITY) {
        Some(t) => Some(Capacity {
            max_concurrent: t.get(1).ok_or_else(|| CoordinationError::InvalidRecord("capacity tag missing max".into()))?.parse().map_err(|_| CoordinationError::InvalidRecord("invalid capacity max".into()))?,
            queue_depth: t.get(2).ok_or_else(|| CoordinationError::InvalidRecord("capacity tag missing queue depth".into()))?.parse().map_err(|_| CoordinationError::InvalidRecord("invalid capacity queue depth".into()))?,
        }),
        None => None,
    };

    let model = record.first_tag(tag::MODEL).and_then(|t| t.get(1).cloned());
    let skills = record.first_tag(tag::SKILLS).map(|t| t[1..].iter().cloned().collect::<HashSet<_>>());

    let metadata = if record.content.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_str(&record.content).map_err(|e| CoordinationError::InvalidRecord(format!("metadata is not valid JSON: {e}")))?
    };

    Ok(Capability {
        author: record.author_pubkey.clone(),
        identifier: identifier.clone(),
        supported_kinds,
        supported_nips,
        agent_type,
        payment_address,
        pricing,
        capacity,
        model,
        skills,
        metadata,
        created_at: record.created_at,
    })
}

/// A query against capability advertisements.
#[derive(Debug, Clone, Default)]
pub struct CapabilityQuery {
    pub pubkeys: Option<Vec<Pubkey>>,
    pub required_kinds: Option<Vec<u32>>,
    pub agent_types: Option<Vec<AgentType>>,
    pub max_price: Option<u128>,
    pub address_prefix: Option<String>,
    pub limit: Option<usize>,
}

fn priced_sum(cap: &Capability, kinds: &[u32]) -> Option<u128> {
    let mut sum = 0u128;
    for k in kinds {
        sum = sum.checked_add(cap.pricing.get(k)?.amount)?;
    }
    Some(sum)
}

fn passes_max_price(cap: &Capability, query: &CapabilityQuery) -> bool {
    let Some(max_price) = query.max_price else { return true };
    match &query.required_kinds {
        Some(kinds) => priced_sum(cap, kinds).map(|s| s <= max_price).unwrap_or(false),
        None => cap.pricing.values().any(|p| p.amount <= max_price),
    }
}

/// Query local capability records, filter, and rank.
pub async fn query(store: &dyn EventStore, query: &CapabilityQuery) -> Result<Vec<Capability>> {
    let mut filter = EventFilter::for_kinds([kind::CAPABILITY]);
    if let Some(kinds) = &query.required_kinds {
        filter.tag_filters.insert(tag::KIND.to_string(), kinds.iter().map(u32::to_string).collect());
    }
    if let Some(pubkeys) = &query.pubkeys {
        filter.authors = Some(pubkeys.iter().cloned().collect());
    }
    filter.limit = query.limit;

    let records = store.query_events(&filter).await?;

    let mut capabilities: Vec<Capability> = Vec::new();
    for record in &records {
        match parse(record) {
            Ok(cap) => capabilities.push(cap),
            Err(e) => tracing::warn!(error = %e, "skipping invalid capability record"),
        }
    }

    // For any (author, d) pair, only the record with the greatest created_at
    // is authoritative.
    let mut latest: HashMap<(Pubkey, String), Capability> = HashMap::new();
    for cap in capabilities {
        let key = (cap.author.clone(), cap.identifier.clone());
        match latest.get(&key) {
            Some(existing) if existing.created_at >= cap.created_at => {}
            _ => {
                latest.insert(key, cap);
            }
        }
    }
    let mut capabilities: Vec<Capability> = latest.into_values().collect();

    capabilities.retain(|cap| {
        if let Some(agent_types) = &query.agent_types {
            if !agent_types.iter().any(|t| std::mem::discriminant(t) == std::mem::discriminant(&cap.agent_type)) {
                return false;
            }
        }
        if let Some(required_kinds) = &query.required_kinds {
            if !required_kinds.iter().all(|k| cap.supported_kinds.contains(k)) {
                return false;
            }
        }
        if !passes_max_price(cap, query) {
            return false;
        }
        if let Some(prefix) = &query.address_prefix {
            if !cap.payment_address.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    });

    capabilities.sort_by(|a, b| {
        let price_key = |c: &Capability| match &query.required_kinds {
            Some(kinds) => priced_sum(c, kinds),
            None => c.pricing.values().map(|p| p.amount).min(),
        };
        let (pa, pb) = (price_key(a), price_key(b));
        let price_order = match (pa, pb) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        price_order
            .then_with(|| {
                let ca = a.capacity.map(|c| c.max_concurrent).unwrap_or(0);
                let cb = b.capacity.map(|c| c.max_concurrent).unwrap_or(0);
                cb.cmp(&ca)
            })
            .then_with(|| b.created_at.cmp(&a.created_at))
    });

    if let Some(limit) = query.limit {
        capabilities.truncate(limit);
    }

    Ok(capabilities)
}
