//! In-memory reference implementation of [`OrderStore`].
//!
//! Used by the test suite and by embedders that do not need durability.
//! Enforces the same uniqueness constraints a relational schema would:
//! order hash, fill `(ringhash, order_hash)`, cancel
//! `(order_hash, tx_hash)`, ring `ring_index`, block hash and parent hash.

use std::cmp::Ordering;
use std::collections::HashMap;

use alloy_primitives::{aliases::U512, Address, B256, U256};
use async_trait::async_trait;
use parking_lot::RwLock;
use relay_common::{big_int_string, OrderStatus};

use crate::error::{RelayError, Result};
use crate::store::{
    BlockRow, CancelRow, CutoffRow, FillQuery, FillRow, OrderQuery, OrderRow, OrderStore,
    PageResult, RingMinedQuery, RingMinedRow,
};

#[derive(Default)]
struct Inner {
    orders: HashMap<String, OrderRow>,
    fills: HashMap<(String, String), FillRow>,
    cancels: HashMap<(String, String), CancelRow>,
    rings: HashMap<String, RingMinedRow>,
    cutoffs: HashMap<String, CutoffRow>,
    blocks: Vec<BlockRow>,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Thread-safe in-memory store. The lock is never held across an await.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Ascending `amount_s / amount_b`, ties by earliest creation time.
fn price_row_cmp(a: &OrderRow, b: &OrderRow) -> Ordering {
    let (a_s, a_b, a_ts) = a.price_key();
    let (b_s, b_b, b_ts) = b.price_key();
    let lhs: U512 = a_s.widening_mul(b_b);
    let rhs: U512 = b_s.widening_mul(a_b);
    lhs.cmp(&rhs).then(a_ts.cmp(&b_ts))
}

fn page<T: Clone>(mut data: Vec<T>, page_index: usize, page_size: usize) -> PageResult<T> {
    let page_index = page_index.max(1);
    let page_size = page_size.max(1);
    let total = data.len();
    let start = (page_index - 1).saturating_mul(page_size);
    let data = if start >= total {
        Vec::new()
    } else {
        data.drain(start..(start + page_size).min(total)).collect()
    };
    PageResult {
        data,
        page_index,
        page_size,
        total,
    }
}

fn order_matches(row: &OrderRow, query: &OrderQuery) -> bool {
    if let Some(owner) = query.owner {
        if row.owner != owner.to_string() {
            return false;
        }
    }
    if let Some(protocol) = query.protocol {
        if row.protocol != protocol.to_string() {
            return false;
        }
    }
    if let Some(token_s) = query.token_s {
        if row.token_s != token_s.to_string() {
            return false;
        }
    }
    if let Some(token_b) = query.token_b {
        if row.token_b != token_b.to_string() {
            return false;
        }
    }
    if let Some(status) = query.status {
        if row.status != status.as_u8() {
            return false;
        }
    }
    if let Some(hash) = query.order_hash {
        if row.order_hash != hash.to_string() {
            return false;
        }
    }
    if let Some(ref market) = query.market {
        if &row.market != market {
            return false;
        }
    }
    true
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, mut row: OrderRow) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.orders.contains_key(&row.order_hash) {
            return Err(RelayError::Duplicate { entity: "order" });
        }
        row.id = inner.next_id();
        inner.orders.insert(row.order_hash.clone(), row);
        Ok(())
    }

    async fn order_by_hash(&self, hash: B256) -> Result<OrderRow> {
        self.inner
            .read()
            .orders
            .get(&hash.to_string())
            .cloned()
            .ok_or(RelayError::NotFound("order"))
    }

    async fn orders_for_miner(
        &self,
        protocol: Address,
        token_s: Address,
        token_b: Address,
        length: usize,
        exclude_status: &[OrderStatus],
        mark_threshold: i64,
    ) -> Result<Vec<OrderRow>> {
        let excluded: Vec<u8> = exclude_status.iter().map(|s| s.as_u8()).collect();
        let protocol = protocol.to_string();
        let token_s = token_s.to_string();
        let token_b = token_b.to_string();

        let mut rows: Vec<OrderRow> = self
            .inner
            .read()
            .orders
            .values()
            .filter(|row| {
                row.protocol == protocol
                    && row.token_s == token_s
                    && row.token_b == token_b
                    && !excluded.contains(&row.status)
                    && row.miner_block_mark <= mark_threshold
            })
            .cloned()
            .collect();
        rows.sort_by(price_row_cmp);
        rows.truncate(length);
        Ok(rows)
    }

    async fn order_book(
        &self,
        protocol: Address,
        token_s: Address,
        token_b: Address,
        length: usize,
    ) -> Result<Vec<OrderRow>> {
        let live = [OrderStatus::New.as_u8(), OrderStatus::Partial.as_u8()];
        let protocol = protocol.to_string();
        let token_s = token_s.to_string();
        let token_b = token_b.to_string();

        let mut rows: Vec<OrderRow> = self
            .inner
            .read()
            .orders
            .values()
            .filter(|row| {
                row.protocol == protocol
                    && row.token_s == token_s
                    && row.token_b == token_b
                    && live.contains(&row.status)
            })
            .cloned()
            .collect();
        rows.sort_by(price_row_cmp);
        rows.truncate(length);
        Ok(rows)
    }

    async fn order_page_query(
        &self,
        query: &OrderQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<OrderRow>> {
        let mut rows: Vec<OrderRow> = self
            .inner
            .read()
            .orders
            .values()
            .filter(|row| order_matches(row, query))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.id);
        Ok(page(rows, page_index, page_size))
    }

    async fn update_order_while_fill(
        &self,
        hash: B256,
        status: OrderStatus,
        dealt_amount_s: U256,
        dealt_amount_b: U256,
        updated_block: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let row = inner
            .orders
            .get_mut(&hash.to_string())
            .ok_or(RelayError::NotFound("order"))?;
        row.status = status.as_u8();
        row.dealt_amount_s = big_int_string(dealt_amount_s);
        row.dealt_amount_b = big_int_string(dealt_amount_b);
        row.updated_block = updated_block as i64;
        Ok(())
    }

    async fn update_order_while_cancel(
        &self,
        hash: B256,
        status: OrderStatus,
        cancelled_amount_s: U256,
        cancelled_amount_b: U256,
        updated_block: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let row = inner
            .orders
            .get_mut(&hash.to_string())
            .ok_or(RelayError::NotFound("order"))?;
        row.status = status.as_u8();
        row.cancelled_amount_s = big_int_string(cancelled_amount_s);
        row.cancelled_amount_b = big_int_string(cancelled_amount_b);
        row.updated_block = updated_block as i64;
        Ok(())
    }

    async fn update_order_while_rollback(
        &self,
        hash: B256,
        status: OrderStatus,
        dealt_amount_s: U256,
        dealt_amount_b: U256,
        cancelled_amount_s: U256,
        cancelled_amount_b: U256,
        updated_block: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let row = inner
            .orders
            .get_mut(&hash.to_string())
            .ok_or(RelayError::NotFound("order"))?;
        row.status = status.as_u8();
        row.dealt_amount_s = big_int_string(dealt_amount_s);
        row.dealt_amount_b = big_int_string(dealt_amount_b);
        row.cancelled_amount_s = big_int_string(cancelled_amount_s);
        row.cancelled_amount_b = big_int_string(cancelled_amount_b);
        row.updated_block = updated_block as i64;
        Ok(())
    }

    async fn update_broadcast_time(&self, hash: B256, broadcast_time: i64) -> Result<()> {
        let mut inner = self.inner.write();
        let row = inner
            .orders
            .get_mut(&hash.to_string())
            .ok_or(RelayError::NotFound("order"))?;
        row.broadcast_time = row.broadcast_time.max(broadcast_time);
        Ok(())
    }

    async fn mark_miner_orders(&self, hashes: &[B256], block: i64) -> Result<()> {
        let mut inner = self.inner.write();
        for hash in hashes {
            if let Some(row) = inner.orders.get_mut(&hash.to_string()) {
                row.miner_block_mark = block;
            }
        }
        Ok(())
    }

    async fn settle_orders_cutoff_status(&self, owner: Address, cutoff: u64) -> Result<u64> {
        let owner = owner.to_string();
        let live = [OrderStatus::New.as_u8(), OrderStatus::Partial.as_u8()];
        let mut touched = 0;
        let mut inner = self.inner.write();
        for row in inner.orders.values_mut() {
            if row.owner == owner && live.contains(&row.status) && (row.timestamp as u64) < cutoff {
                row.status = OrderStatus::Cutoff.as_u8();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_fill(&self, mut row: FillRow) -> Result<()> {
        let key = (row.ringhash.clone(), row.order_hash.clone());
        let mut inner = self.inner.write();
        if inner.fills.contains_key(&key) {
            return Err(RelayError::Duplicate { entity: "fill" });
        }
        row.id = inner.next_id();
        inner.fills.insert(key, row);
        Ok(())
    }

    async fn fill_by_keys(&self, ringhash: B256, order_hash: B256) -> Result<FillRow> {
        self.inner
            .read()
            .fills
            .get(&(ringhash.to_string(), order_hash.to_string()))
            .cloned()
            .ok_or(RelayError::NotFound("fill"))
    }

    async fn fills_page_query(
        &self,
        query: &FillQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<FillRow>> {
        let mut rows: Vec<FillRow> = self
            .inner
            .read()
            .fills
            .values()
            .filter(|row| {
                query
                    .ringhash
                    .map(|h| row.ringhash == h.to_string())
                    .unwrap_or(true)
                    && query
                        .order_hash
                        .map(|h| row.order_hash == h.to_string())
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.block_number, row.id));
        Ok(page(rows, page_index, page_size))
    }

    async fn fills_above_block(&self, block: u64) -> Result<Vec<FillRow>> {
        let mut rows: Vec<FillRow> = self
            .inner
            .read()
            .fills
            .values()
            .filter(|row| row.block_number as u64 > block)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.block_number, row.id));
        Ok(rows)
    }

    async fn delete_fill(&self, ringhash: B256, order_hash: B256) -> Result<()> {
        self.inner
            .write()
            .fills
            .remove(&(ringhash.to_string(), order_hash.to_string()))
            .map(|_| ())
            .ok_or(RelayError::NotFound("fill"))
    }

    async fn insert_cancel(&self, mut row: CancelRow) -> Result<()> {
        let key = (row.order_hash.clone(), row.tx_hash.clone());
        let mut inner = self.inner.write();
        if inner.cancels.contains_key(&key) {
            return Err(RelayError::Duplicate { entity: "cancel" });
        }
        row.id = inner.next_id();
        inner.cancels.insert(key, row);
        Ok(())
    }

    async fn cancel_by_keys(&self, order_hash: B256, tx_hash: B256) -> Result<CancelRow> {
        self.inner
            .read()
            .cancels
            .get(&(order_hash.to_string(), tx_hash.to_string()))
            .cloned()
            .ok_or(RelayError::NotFound("cancel"))
    }

    async fn cancels_above_block(&self, block: u64) -> Result<Vec<CancelRow>> {
        let mut rows: Vec<CancelRow> = self
            .inner
            .read()
            .cancels
            .values()
            .filter(|row| row.block_number as u64 > block)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.block_number, row.id));
        Ok(rows)
    }

    async fn delete_cancel(&self, order_hash: B256, tx_hash: B256) -> Result<()> {
        self.inner
            .write()
            .cancels
            .remove(&(order_hash.to_string(), tx_hash.to_string()))
            .map(|_| ())
            .ok_or(RelayError::NotFound("cancel"))
    }

    async fn insert_ring_mined(&self, mut row: RingMinedRow) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.rings.contains_key(&row.ring_index) {
            return Err(RelayError::Duplicate { entity: "ring" });
        }
        row.id = inner.next_id();
        inner.rings.insert(row.ring_index.clone(), row);
        Ok(())
    }

    async fn ring_mined_page_query(
        &self,
        query: &RingMinedQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<RingMinedRow>> {
        let mut rows: Vec<RingMinedRow> = self
            .inner
            .read()
            .rings
            .values()
            .filter(|row| {
                query
                    .ringhash
                    .map(|h| row.ringhash == h.to_string())
                    .unwrap_or(true)
                    && query
                        .ring_index
                        .map(|i| row.ring_index == i.to_string())
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.block_number, row.id));
        Ok(page(rows, page_index, page_size))
    }

    async fn set_cutoff(&self, row: CutoffRow) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.cutoffs.get_mut(&row.owner) {
            Some(existing) => {
                if row.cutoff > existing.cutoff {
                    existing.cutoff = row.cutoff;
                    existing.block_number = row.block_number;
                }
            }
            None => {
                let mut row = row;
                row.id = inner.next_id();
                inner.cutoffs.insert(row.owner.clone(), row);
            }
        }
        Ok(())
    }

    async fn cutoff_by_owner(&self, owner: Address) -> Result<CutoffRow> {
        self.inner
            .read()
            .cutoffs
            .get(&owner.to_string())
            .cloned()
            .ok_or(RelayError::NotFound("cutoff"))
    }

    async fn all_cutoffs(&self) -> Result<Vec<CutoffRow>> {
        Ok(self.inner.read().cutoffs.values().cloned().collect())
    }

    async fn insert_block(&self, mut row: BlockRow) -> Result<()> {
        let mut inner = self.inner.write();
        if inner
            .blocks
            .iter()
            .any(|b| b.block_hash == row.block_hash || b.parent_hash == row.parent_hash)
        {
            return Err(RelayError::Duplicate { entity: "block" });
        }
        row.id = inner.next_id();
        inner.blocks.push(row);
        Ok(())
    }

    async fn block_by_hash(&self, hash: B256) -> Result<BlockRow> {
        let hash = hash.to_string();
        self.inner
            .read()
            .blocks
            .iter()
            .find(|b| b.block_hash == hash)
            .cloned()
            .ok_or(RelayError::NotFound("block"))
    }

    async fn block_by_parent_hash(&self, parent_hash: B256) -> Result<BlockRow> {
        let parent_hash = parent_hash.to_string();
        self.inner
            .read()
            .blocks
            .iter()
            .find(|b| b.parent_hash == parent_hash)
            .cloned()
            .ok_or(RelayError::NotFound("block"))
    }

    async fn latest_block(&self) -> Result<BlockRow> {
        self.inner
            .read()
            .blocks
            .iter()
            .max_by_key(|b| (b.created_at, b.id))
            .cloned()
            .ok_or(RelayError::NotFound("block"))
    }

    async fn mark_blocks_forked_above(&self, number: u64) -> Result<u64> {
        let mut touched = 0;
        let mut inner = self.inner.write();
        for block in inner.blocks.iter_mut() {
            if block.block_number as u64 > number && !block.fork {
                block.fork = true;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use relay_common::{Block, Order, OrderState};

    fn order_with(hash: u8, amount_s: u64, amount_b: u64, timestamp: u64) -> OrderState {
        let order = Order {
            protocol: address!("0x1111111111111111111111111111111111111111"),
            owner: address!("0x2222222222222222222222222222222222222222"),
            hash: B256::with_last_byte(hash),
            token_s: address!("0x3333333333333333333333333333333333333333"),
            token_b: address!("0x4444444444444444444444444444444444444444"),
            amount_s: U256::from(amount_s),
            amount_b: U256::from(amount_b),
            timestamp,
            ttl: 86_400,
            salt: U256::from(7u64),
            lrc_fee: U256::from(5u64),
            buy_no_more_than_amount_b: false,
            margin_split_percentage: 50,
            v: 27,
            r: B256::with_last_byte(2),
            s: B256::with_last_byte(3),
        };
        OrderState::new(order, 100)
    }

    #[tokio::test]
    async fn test_insert_order_rejects_duplicate_hash() {
        let store = InMemoryStore::new();
        let state = order_with(1, 1000, 10, 50);
        store
            .insert_order(OrderRow::convert_down(&state))
            .await
            .unwrap();
        let err = store
            .insert_order(OrderRow::convert_down(&state))
            .await
            .unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn test_fill_unique_on_ringhash_orderhash() {
        let store = InMemoryStore::new();
        let mut row = FillRow {
            id: 0,
            ringhash: B256::with_last_byte(1).to_string(),
            order_hash: B256::with_last_byte(2).to_string(),
            ring_index: "1".into(),
            amount_s: "400".into(),
            amount_b: "4".into(),
            lrc_fee: "".into(),
            lrc_reward: "".into(),
            split_s: "".into(),
            split_b: "".into(),
            block_number: 101,
            tx_hash: B256::with_last_byte(9).to_string(),
            created_at: chrono::Utc::now(),
        };
        store.insert_fill(row.clone()).await.unwrap();
        assert!(store.insert_fill(row.clone()).await.is_err());

        // Same ring, different order is a distinct key.
        row.order_hash = B256::with_last_byte(3).to_string();
        store.insert_fill(row).await.unwrap();
    }

    #[tokio::test]
    async fn test_orders_for_miner_price_ascending() {
        let store = InMemoryStore::new();
        // 1200/10 > 1000/10 > 800/10.
        for (hash, amount_s) in [(1u8, 1200u64), (2, 800), (3, 1000)] {
            let state = order_with(hash, amount_s, 10, 50);
            store
                .insert_order(OrderRow::convert_down(&state))
                .await
                .unwrap();
        }
        let rows = store
            .orders_for_miner(
                address!("0x1111111111111111111111111111111111111111"),
                address!("0x3333333333333333333333333333333333333333"),
                address!("0x4444444444444444444444444444444444444444"),
                10,
                &[OrderStatus::Finished, OrderStatus::Cutoff, OrderStatus::Cancel],
                1_000_000,
            )
            .await
            .unwrap();
        let hashes: Vec<String> = rows.iter().map(|r| r.order_hash.clone()).collect();
        assert_eq!(
            hashes,
            vec![
                B256::with_last_byte(2).to_string(),
                B256::with_last_byte(3).to_string(),
                B256::with_last_byte(1).to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_orders_for_miner_respects_mark_threshold() {
        let store = InMemoryStore::new();
        let state = order_with(1, 1000, 10, 50);
        let hash = state.raw_order.hash;
        store
            .insert_order(OrderRow::convert_down(&state))
            .await
            .unwrap();
        store.mark_miner_orders(&[hash], 100).await.unwrap();

        let rows = store
            .orders_for_miner(
                state.raw_order.protocol,
                state.raw_order.token_s,
                state.raw_order.token_b,
                10,
                &[],
                97,
            )
            .await
            .unwrap();
        assert!(rows.is_empty());

        let rows = store
            .orders_for_miner(
                state.raw_order.protocol,
                state.raw_order.token_s,
                state.raw_order.token_b,
                10,
                &[],
                100,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_cutoff_only_touches_cohort() {
        let store = InMemoryStore::new();
        for (hash, timestamp) in [(1u8, 50u64), (2, 150), (3, 50)] {
            let state = order_with(hash, 1000, 10, timestamp);
            store
                .insert_order(OrderRow::convert_down(&state))
                .await
                .unwrap();
        }
        let owner = address!("0x2222222222222222222222222222222222222222");
        let touched = store.settle_orders_cutoff_status(owner, 100).await.unwrap();
        assert_eq!(touched, 2);

        let cut = store.order_by_hash(B256::with_last_byte(1)).await.unwrap();
        assert_eq!(cut.status, OrderStatus::Cutoff.as_u8());
        let kept = store.order_by_hash(B256::with_last_byte(2)).await.unwrap();
        assert_eq!(kept.status, OrderStatus::New.as_u8());
    }

    #[tokio::test]
    async fn test_set_cutoff_keeps_maximum() {
        let store = InMemoryStore::new();
        let owner = address!("0x2222222222222222222222222222222222222222");
        let mut row = CutoffRow {
            id: 0,
            owner: owner.to_string(),
            cutoff: 100,
            block_number: 10,
            created_at: chrono::Utc::now(),
        };
        store.set_cutoff(row.clone()).await.unwrap();
        row.cutoff = 50;
        store.set_cutoff(row.clone()).await.unwrap();
        assert_eq!(store.cutoff_by_owner(owner).await.unwrap().cutoff, 100);
        row.cutoff = 200;
        store.set_cutoff(row).await.unwrap();
        assert_eq!(store.cutoff_by_owner(owner).await.unwrap().cutoff, 200);
    }

    #[tokio::test]
    async fn test_block_uniqueness_and_latest() {
        let store = InMemoryStore::new();
        for number in [100u64, 101, 102] {
            let block = Block {
                number,
                hash: B256::with_last_byte(number as u8),
                parent_hash: B256::with_last_byte(number as u8 - 1),
                create_time: 1_700_000_000 + number,
                fork: false,
            };
            store
                .insert_block(BlockRow::convert_down(&block))
                .await
                .unwrap();
        }
        let dup = Block {
            number: 103,
            hash: B256::with_last_byte(100),
            parent_hash: B256::with_last_byte(50),
            create_time: 0,
            fork: false,
        };
        assert!(store.insert_block(BlockRow::convert_down(&dup)).await.is_err());

        assert_eq!(store.latest_block().await.unwrap().block_number, 102);

        let forked = store.mark_blocks_forked_above(100).await.unwrap();
        assert_eq!(forked, 2);
        assert!(store
            .block_by_hash(B256::with_last_byte(101))
            .await
            .unwrap()
            .fork);
        assert!(!store
            .block_by_hash(B256::with_last_byte(100))
            .await
            .unwrap()
            .fork);
    }

    #[tokio::test]
    async fn test_order_page_query() {
        let store = InMemoryStore::new();
        for hash in 1u8..=5 {
            let state = order_with(hash, 1000, 10, 50);
            store
                .insert_order(OrderRow::convert_down(&state))
                .await
                .unwrap();
        }
        let query = OrderQuery {
            owner: Some(address!("0x2222222222222222222222222222222222222222")),
            ..Default::default()
        };
        let result = store.order_page_query(&query, 2, 2).await.unwrap();
        assert_eq!(result.total, 5);
        assert_eq!(result.data.len(), 2);
        assert_eq!(result.page_index, 2);

        let result = store.order_page_query(&query, 4, 2).await.unwrap();
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_time_never_decreases() {
        let store = InMemoryStore::new();
        let state = order_with(1, 1000, 10, 50);
        let hash = state.raw_order.hash;
        store
            .insert_order(OrderRow::convert_down(&state))
            .await
            .unwrap();
        store.update_broadcast_time(hash, 5).await.unwrap();
        store.update_broadcast_time(hash, 3).await.unwrap();
        assert_eq!(store.order_by_hash(hash).await.unwrap().broadcast_time, 5);
    }
}
