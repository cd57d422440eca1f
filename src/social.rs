//! Social discovery: k-hop (k ≤ 2) expansion over the follow graph,
//! distance-ranked peer selection, with self and direct-follow exclusion.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::capability::{Capability, CapabilityQuery};
use crate::cache::CapabilityCache;
use crate::errors::{Pubkey, Result};
use crate::record::{kind, tag, SignedRecord};
use crate::transport::{EventFilter, EventStore, FollowGraphRouter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    pub pubkey: Pubkey,
    pub payment_address: String,
    pub social_distance: u8,
    pub capability: Capability,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub extended_hops: bool,
    pub limit: Option<usize>,
    pub use_cache: bool,
    /// Optional deadline; on expiry the 1-hop entries collected so far are
    /// returned.
    pub deadline: Option<Duration>,
}

async fn lookup_capability(
    store: &dyn EventStore,
    cache: Option<&CapabilityCache>,
    use_cache: bool,
    pubkey: &str,
    required_kind: u32,
) -> Option<Capability> {
    if use_cache {
        if let Some(cache) = cache {
            if let Some(cap) = cache.get(pubkey).await {
                return Some(cap);
            }
        }
    }
    let query = CapabilityQuery { pubkeys: Some(vec![pubkey.to_string()]), required_kinds: Some(vec![required_kind]), limit: Some(1), ..Default::default() };
    match crate::capability::query(store, &query).await {
        Ok(mut results) => results.pop(),
        Err(e) => {
            tracing::warn!(error = %e, pubkey, "capability lookup failed during discovery");
            None
        }
    }
}

async fn one_hop(
    store: &dyn EventStore,
    router: &dyn FollowGraphRouter,
    cache: Option<&CapabilityCache>,
    required_kind: u32,
    options: &DiscoveryOptions,
    self_pubkey: &str,
    collected: &AsyncMutex<Vec<DiscoveredPeer>>,
) -> Result<Vec<(Pubkey, String)>> {
    let follows = router.list_follows().await?;
    let mut direct_follows = Vec::new();

    for follow in &follows {
        if follow.pubkey == self_pubkey {
            continue;
        }
        direct_follows.push((follow.pubkey.clone(), follow.payment_address.clone()));

        if let Some(limit) = options.limit {
            if collected.lock().await.len() >= limit {
                break;
            }
        }

        if let Some(capability) = lookup_capability(store, cache, options.use_cache, &follow.pubkey, required_kind).await {
            if capability.supported_kinds.contains(&required_kind) {
                collected.lock().await.push(DiscoveredPeer {
                    pubkey: follow.pubkey.clone(),
                    payment_address: follow.payment_address.clone(),
                    social_distance: 1,
                    capability,
                });
            }
        }
    }

    Ok(direct_follows)
}

async fn two_hop_candidates(store: &dyn EventStore, direct_follows: &[(Pubkey, String)], self_pubkey: &str) -> Result<HashSet<Pubkey>> {
    let authors: HashSet<String> = direct_follows.iter().map(|(p, _)| p.clone()).collect();
    let filter = EventFilter { authors: Some(authors), ..EventFilter::for_kinds([kind::FOLLOW_LIST]) };
    let records: Vec<SignedRecord> = store.query_events(&filter).await?;

    let direct: HashSet<&str> = direct_follows.iter().map(|(p, _)| p.as_str()).collect();
    let mut candidates = HashSet::new();
    for record in &records {
        for t in record.tags_named(tag::ILP) {
            if let Some(pubkey) = t.get(1) {
                if pubkey != self_pubkey && !direct.contains(pubkey.as_str()) {
                    candidates.insert(pubkey.clone());
                }
            }
        }
    }
    Ok(candidates)
}

/// Discover peers that support `required_kind`.
///
/// Any failure in the 2-hop phase is logged and the function still returns
/// the 1-hop results collected so far — a resilience behavior, not an error.
/// Peers found before `options.deadline` elapses are never discarded: both
/// hops push straight into a shared buffer, so a cancelled 2-hop phase (or
/// even a cancelled 1-hop phase) still yields whatever had already landed.
pub async fn discover_for_kind(
    store: &dyn EventStore,
    router: &dyn FollowGraphRouter,
    cache: Option<&CapabilityCache>,
    self_pubkey: &str,
    required_kind: u32,
    options: DiscoveryOptions,
) -> Result<Vec<DiscoveredPeer>> {
    let collected: Arc<AsyncMutex<Vec<DiscoveredPeer>>> = Arc::new(AsyncMutex::new(Vec::new()));
    let deadline = options.deadline;
    let limit = options.limit;

    let run = {
        let collected = collected.clone();
        async move {
            let direct_follows = one_hop(store, router, cache, required_kind, &options, self_pubkey, &collected).await?;

            let reached_limit = {
                let guard = collected.lock().await;
                options.limit.map(|l| guard.len() >= l).unwrap_or(false)
            };
            if options.extended_hops && !reached_limit {
                let two_hop_outcome: Result<()> = async {
                    let candidates = two_hop_candidates(store, &direct_follows, self_pubkey).await?;
                    for pubkey in candidates {
                        if let Some(limit) = options.limit {
                            if collected.lock().await.len() >= limit {
                                break;
                            }
                        }
                        if let Some(capability) = lookup_capability(store, cache, options.use_cache, &pubkey, required_kind).await {
                            if capability.supported_kinds.contains(&required_kind) {
                                let payment_address = capability.payment_address.clone();
                                collected.lock().await.push(DiscoveredPeer { pubkey, payment_address, social_distance: 2, capability });
                            }
                        }
                    }
                    Ok(())
                }
                .await;

                if let Err(e) = two_hop_outcome {
                    tracing::warn!(error = %e, "2-hop discovery failed, degrading to 1-hop results");
                }
            }
            Ok::<(), crate::errors::CoordinationError>(())
        }
    };

    let timed_out = match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, run).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => return Err(e),
            Err(_) => true,
        },
        None => {
            run.await?;
            false
        }
    };
    if timed_out {
        tracing::warn!("discovery deadline exceeded, returning partial results collected so far");
    }

    let mut results = collected.lock().await.clone();
    results.sort_by_key(|p| p.social_distance);
    if let Some(limit) = limit {
        results.truncate(limit);
    }
    Ok(results)
}
