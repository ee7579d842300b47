//! Write-through cache of per-owner cutoff timestamps.
//!
//! Serves the hot-path checks during gateway ingestion and matcher queries
//! without a store round trip. Only the highest cutoff per owner is
//! retained.

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;
use relay_common::CutoffEvent;
use tracing::warn;

use crate::error::Result;
use crate::store::{CutoffRow, OrderStore};

#[derive(Debug, Clone, Copy)]
struct CutoffEntry {
    cutoff: u64,
    #[allow(dead_code)]
    block: u64,
}

pub struct CutoffCache {
    store: Arc<dyn OrderStore>,
    cache: DashMap<Address, CutoffEntry>,
}

impl CutoffCache {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Pre-load every persisted cutoff so gateway checks never miss
    /// cohorts settled before a restart.
    pub async fn warm(&self) -> Result<usize> {
        let rows = self.store.all_cutoffs().await?;
        let mut loaded = 0;
        for row in rows {
            let owner = match row.owner_address() {
                Ok(owner) => owner,
                Err(err) => {
                    warn!(owner = %row.owner, error = %err, "cutoff cache, skipping bad row");
                    continue;
                }
            };
            self.apply(owner, row.cutoff as u64, row.block_number as u64);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Record a cutoff event, keeping the per-owner maximum, and mirror it
    /// to the store.
    pub async fn add(&self, event: &CutoffEvent) -> Result<()> {
        self.apply(event.owner, event.cutoff, event.block_number);
        self.store.set_cutoff(CutoffRow::convert_down(event)).await
    }

    fn apply(&self, owner: Address, cutoff: u64, block: u64) {
        self.cache
            .entry(owner)
            .and_modify(|entry| {
                if cutoff > entry.cutoff {
                    entry.cutoff = cutoff;
                    entry.block = block;
                }
            })
            .or_insert(CutoffEntry { cutoff, block });
    }

    /// True iff a cutoff exists for `owner` with `cutoff >= create_time`.
    pub fn is_order_cutoff(&self, owner: Address, create_time: u64) -> bool {
        self.cache
            .get(&owner)
            .map(|entry| entry.cutoff >= create_time)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use alloy_primitives::{address, B256};

    fn event(owner: Address, cutoff: u64, block: u64) -> CutoffEvent {
        CutoffEvent {
            owner,
            cutoff,
            block_number: block,
            tx_hash: B256::with_last_byte(1),
        }
    }

    #[tokio::test]
    async fn test_add_keeps_maximum_and_writes_through() {
        let store = Arc::new(InMemoryStore::new());
        let cache = CutoffCache::new(store.clone());
        let owner = address!("0x2222222222222222222222222222222222222222");

        cache.add(&event(owner, 100, 10)).await.unwrap();
        cache.add(&event(owner, 50, 11)).await.unwrap();

        assert!(cache.is_order_cutoff(owner, 100));
        assert!(!cache.is_order_cutoff(owner, 101));
        assert_eq!(store.cutoff_by_owner(owner).await.unwrap().cutoff, 100);
    }

    #[tokio::test]
    async fn test_boundary_is_inclusive() {
        let store = Arc::new(InMemoryStore::new());
        let cache = CutoffCache::new(store);
        let owner = address!("0x2222222222222222222222222222222222222222");
        cache.add(&event(owner, 100, 10)).await.unwrap();

        // cutoff >= createTime rejects an order created exactly at the
        // cutoff second.
        assert!(cache.is_order_cutoff(owner, 100));
        assert!(cache.is_order_cutoff(owner, 99));
        assert!(!cache.is_order_cutoff(owner, 101));
    }

    #[tokio::test]
    async fn test_unknown_owner_is_not_cutoff() {
        let store = Arc::new(InMemoryStore::new());
        let cache = CutoffCache::new(store);
        assert!(!cache.is_order_cutoff(Address::ZERO, 0));
    }

    #[tokio::test]
    async fn test_warm_loads_persisted_rows() {
        let store = Arc::new(InMemoryStore::new());
        let owner = address!("0x2222222222222222222222222222222222222222");
        {
            let cache = CutoffCache::new(store.clone());
            cache.add(&event(owner, 100, 10)).await.unwrap();
        }
        let cache = CutoffCache::new(store);
        assert!(!cache.is_order_cutoff(owner, 50));
        assert_eq!(cache.warm().await.unwrap(), 1);
        assert!(cache.is_order_cutoff(owner, 50));
    }
}
