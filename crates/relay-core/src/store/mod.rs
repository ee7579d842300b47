//! Typed persistence contract over orders, fills, cancels, ring-mined
//! records, cutoffs and blocks.
//!
//! Every write is a single-row transaction. Inserts with unique keys
//! (order hash; fill `(ringhash, order_hash)`; cancel
//! `(order_hash, tx_hash)`; ring `ring_index`; block hash/parent hash)
//! reject duplicates with [`RelayError::Duplicate`], which callers on the
//! event paths treat as benign idempotency.

mod memory;
mod rows;

pub use memory::InMemoryStore;
pub use rows::{BlockRow, CancelRow, CutoffRow, FillRow, OrderRow, RingMinedRow};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use relay_common::OrderStatus;

use crate::error::Result;

/// One page of a paged query. Page indexes are 1-based.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub data: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Field filter for paged order queries; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub owner: Option<Address>,
    pub protocol: Option<Address>,
    pub token_s: Option<Address>,
    pub token_b: Option<Address>,
    pub status: Option<OrderStatus>,
    pub order_hash: Option<B256>,
    pub market: Option<String>,
}

/// Field filter for paged fill queries.
#[derive(Debug, Clone, Default)]
pub struct FillQuery {
    pub ringhash: Option<B256>,
    pub order_hash: Option<B256>,
}

/// Field filter for paged ring-mined queries.
#[derive(Debug, Clone, Default)]
pub struct RingMinedQuery {
    pub ringhash: Option<B256>,
    pub ring_index: Option<U256>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    // ---- orders ----

    /// Insert a new order row. `Duplicate` if the hash is already stored.
    async fn insert_order(&self, row: OrderRow) -> Result<()>;

    async fn order_by_hash(&self, hash: B256) -> Result<OrderRow>;

    /// Candidate orders for the miner feed: matching market triple, status
    /// not in `exclude_status`, `miner_block_mark <= mark_threshold`.
    /// Ordered ascending by price (`amount_s / amount_b`), ties by earliest
    /// creation time, truncated to `length`.
    async fn orders_for_miner(
        &self,
        protocol: Address,
        token_s: Address,
        token_b: Address,
        length: usize,
        exclude_status: &[OrderStatus],
        mark_threshold: i64,
    ) -> Result<Vec<OrderRow>>;

    /// Raw order-book candidates (NEW/PARTIAL only), price ascending.
    async fn order_book(
        &self,
        protocol: Address,
        token_s: Address,
        token_b: Address,
        length: usize,
    ) -> Result<Vec<OrderRow>>;

    async fn order_page_query(
        &self,
        query: &OrderQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<OrderRow>>;

    /// Targeted update after a fill.
    async fn update_order_while_fill(
        &self,
        hash: B256,
        status: OrderStatus,
        dealt_amount_s: U256,
        dealt_amount_b: U256,
        updated_block: u64,
    ) -> Result<()>;

    /// Targeted update after a cancel.
    async fn update_order_while_cancel(
        &self,
        hash: B256,
        status: OrderStatus,
        cancelled_amount_s: U256,
        cancelled_amount_b: U256,
        updated_block: u64,
    ) -> Result<()>;

    /// Full amount/status rewrite used by fork inversion.
    #[allow(clippy::too_many_arguments)]
    async fn update_order_while_rollback(
        &self,
        hash: B256,
        status: OrderStatus,
        dealt_amount_s: U256,
        dealt_amount_b: U256,
        cancelled_amount_s: U256,
        cancelled_amount_b: U256,
        updated_block: u64,
    ) -> Result<()>;

    /// Mirror the P2P re-broadcast counter; never decreases.
    async fn update_broadcast_time(&self, hash: B256, broadcast_time: i64) -> Result<()>;

    /// Stamp `miner_block_mark` on a set of orders.
    async fn mark_miner_orders(&self, hashes: &[B256], block: i64) -> Result<()>;

    /// Set status=CUTOFF on every NEW/PARTIAL order of `owner` created
    /// strictly before `cutoff`. Returns the number of rows touched.
    async fn settle_orders_cutoff_status(&self, owner: Address, cutoff: u64) -> Result<u64>;

    // ---- fills ----

    async fn insert_fill(&self, row: FillRow) -> Result<()>;

    async fn fill_by_keys(&self, ringhash: B256, order_hash: B256) -> Result<FillRow>;

    async fn fills_page_query(
        &self,
        query: &FillQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<FillRow>>;

    async fn fills_above_block(&self, block: u64) -> Result<Vec<FillRow>>;

    async fn delete_fill(&self, ringhash: B256, order_hash: B256) -> Result<()>;

    // ---- cancels ----

    async fn insert_cancel(&self, row: CancelRow) -> Result<()>;

    async fn cancel_by_keys(&self, order_hash: B256, tx_hash: B256) -> Result<CancelRow>;

    async fn cancels_above_block(&self, block: u64) -> Result<Vec<CancelRow>>;

    async fn delete_cancel(&self, order_hash: B256, tx_hash: B256) -> Result<()>;

    // ---- ring-mined ----

    async fn insert_ring_mined(&self, row: RingMinedRow) -> Result<()>;

    async fn ring_mined_page_query(
        &self,
        query: &RingMinedQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<RingMinedRow>>;

    // ---- cutoffs ----

    /// Upsert keeping the highest cutoff per owner.
    async fn set_cutoff(&self, row: CutoffRow) -> Result<()>;

    async fn cutoff_by_owner(&self, owner: Address) -> Result<CutoffRow>;

    async fn all_cutoffs(&self) -> Result<Vec<CutoffRow>>;

    // ---- blocks ----

    async fn insert_block(&self, row: BlockRow) -> Result<()>;

    async fn block_by_hash(&self, hash: B256) -> Result<BlockRow>;

    async fn block_by_parent_hash(&self, parent_hash: B256) -> Result<BlockRow>;

    /// Most recently observed block, by insertion time.
    async fn latest_block(&self) -> Result<BlockRow>;

    /// Flag every block above `number` as forked. Returns the count.
    async fn mark_blocks_forked_above(&self, number: u64) -> Result<u64>;
}
