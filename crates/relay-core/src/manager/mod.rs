//! Order lifecycle engine.
//!
//! Applies each gateway or chain event to one order's state, enforcing
//! legal transitions; terminal orders (FINISHED / CANCEL / CUTOFF) only
//! move again through a fork rollback. One handler value is registered on
//! all six router topics, so per-order mutation is serialized by the
//! router's per-topic sequencing plus the store's row-level updates.

mod feed;

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::Utc;
use relay_common::{
    CutoffEvent, ForkEvent, Order, OrderCancelledEvent, OrderFilledEvent, OrderState, OrderStatus,
    RingMinedEvent,
};
use tracing::{debug, info, warn};

use crate::accessor::{BlockTag, ChainAccessor, MarketCapProvider, OwnerWhitelist};
use crate::accounts::AccountManager;
use crate::config::OrderManagerOptions;
use crate::cutoff::CutoffCache;
use crate::error::{RelayError, Result};
use crate::fork::ForkProcessor;
use crate::funds::FundChecker;
use crate::router::{ChainEvent, EventHandler, EventRouter, Topic};
use crate::store::{
    CancelRow, FillQuery, FillRow, OrderQuery, OrderRow, OrderStore, PageResult, RingMinedQuery,
    RingMinedRow,
};

pub struct OrderManager {
    options: OrderManagerOptions,
    store: Arc<dyn OrderStore>,
    accessor: Arc<dyn ChainAccessor>,
    whitelist: Arc<dyn OwnerWhitelist>,
    cutoff_cache: CutoffCache,
    funds: FundChecker,
    fork_processor: ForkProcessor,
    accounts: Arc<AccountManager>,
}

impl OrderManager {
    pub fn new(
        options: OrderManagerOptions,
        store: Arc<dyn OrderStore>,
        accessor: Arc<dyn ChainAccessor>,
        market_cap: Arc<dyn MarketCapProvider>,
        whitelist: Arc<dyn OwnerWhitelist>,
        accounts: Arc<AccountManager>,
    ) -> Arc<Self> {
        let threshold = options.value_threshold();
        Arc::new(Self {
            cutoff_cache: CutoffCache::new(store.clone()),
            funds: FundChecker::new(accessor.clone(), market_cap.clone(), threshold),
            fork_processor: ForkProcessor::new(store.clone(), market_cap, threshold),
            options,
            store,
            accessor,
            whitelist,
            accounts,
        })
    }

    /// Warm the cutoff cache and register on every router topic.
    pub async fn start(self: &Arc<Self>, router: &EventRouter) -> Result<()> {
        let loaded = self.cutoff_cache.warm().await?;
        debug!(loaded, "order manager, cutoff cache warmed");

        let handler: Arc<dyn EventHandler> = Arc::new(ManagerHandler(self.clone()));
        for topic in [
            Topic::GatewayNewOrder,
            Topic::RingMined,
            Topic::OrderFilled,
            Topic::OrderCancelled,
            Topic::CutoffChanged,
            Topic::Fork,
        ] {
            router.subscribe(topic, handler.clone());
        }
        Ok(())
    }

    // ---- event paths ----

    /// New order from the P2P gateway. Re-broadcasts and cutoff owners are
    /// dropped silently; RPC failures fail fast so the gateway can retry.
    pub async fn handle_gateway_order(&self, order: Order) -> Result<()> {
        order.validate(Utc::now().timestamp() as u64)?;

        if self.store.order_by_hash(order.hash).await.is_ok() {
            debug!(order = %order.hash, "order manager, order already known");
            return Ok(());
        }
        if self.cutoff_cache.is_order_cutoff(order.owner, order.timestamp) {
            debug!(order = %order.hash, owner = %order.owner, "order manager, order is cutoff");
            return Ok(());
        }

        let head = self.accessor.latest_block_number().await?;
        let mut state = OrderState::new(order, head);

        // The settlement contract reports one S-side aggregate for
        // everything already cancelled or filled before we saw the order.
        state.cancelled_amount_s = self
            .accessor
            .cancelled_or_filled(state.raw_order.protocol, state.raw_order.hash, BlockTag::Latest)
            .await?;

        let finished = self.funds.is_order_full_finished(&state).await?;
        if finished {
            state.status = OrderStatus::Finished;
        } else {
            self.funds.probe_one(&mut state).await?;
            if self.funds.is_fund_insufficient(&state).await? {
                state.miner_block_mark = state.updated_block + self.options.account_period;
            }
        }

        debug!(
            order = %state.raw_order.hash,
            status = %state.status,
            mark = state.miner_block_mark,
            "order manager, handle gateway order"
        );
        match self.store.insert_order(OrderRow::convert_down(&state)).await {
            Err(err) if err.is_benign() => Ok(()),
            other => other,
        }
    }

    /// Purely archival; the per-order effects arrive as fill events.
    pub async fn handle_ring_mined(&self, event: RingMinedEvent) -> Result<()> {
        debug!(ring_index = %event.ring_index, "order manager, handle ring mined");
        self.store
            .insert_ring_mined(RingMinedRow::convert_down(&event))
            .await
    }

    pub async fn handle_order_filled(&self, event: OrderFilledEvent) -> Result<()> {
        if self
            .store
            .fill_by_keys(event.ringhash, event.order_hash)
            .await
            .is_ok()
        {
            return Err(RelayError::Duplicate { entity: "fill" });
        }
        self.store.insert_fill(FillRow::convert_down(&event)).await?;

        let row = self.store.order_by_hash(event.order_hash).await?;
        let mut state = row.convert_up()?;
        self.guard_transition(&state)?;

        state.dealt_amount_s = state
            .dealt_amount_s
            .checked_add(event.amount_s)
            .ok_or_else(|| amount_overflow(event.order_hash))?;
        state.dealt_amount_b = state
            .dealt_amount_b
            .checked_add(event.amount_b)
            .ok_or_else(|| amount_overflow(event.order_hash))?;
        state.updated_block = event.block_number;
        check_conservation(&state)?;

        let finished = self.funds.is_order_full_finished(&state).await?;
        state.status = if finished {
            OrderStatus::Finished
        } else {
            OrderStatus::Partial
        };
        debug!(
            order = %event.order_hash,
            dealt_s = %state.dealt_amount_s,
            dealt_b = %state.dealt_amount_b,
            status = %state.status,
            "order manager, handle order filled"
        );

        self.store
            .update_order_while_fill(
                event.order_hash,
                state.status,
                state.dealt_amount_s,
                state.dealt_amount_b,
                state.updated_block,
            )
            .await
    }

    pub async fn handle_order_cancelled(&self, event: OrderCancelledEvent) -> Result<()> {
        if self
            .store
            .cancel_by_keys(event.order_hash, event.tx_hash)
            .await
            .is_ok()
        {
            return Err(RelayError::Duplicate { entity: "cancel" });
        }
        self.store
            .insert_cancel(CancelRow::convert_down(&event))
            .await?;

        let row = self.store.order_by_hash(event.order_hash).await?;
        let mut state = row.convert_up()?;
        self.guard_transition(&state)?;

        if state.raw_order.buy_no_more_than_amount_b {
            state.cancelled_amount_b = state
                .cancelled_amount_b
                .checked_add(event.amount_cancelled)
                .ok_or_else(|| amount_overflow(event.order_hash))?;
        } else {
            state.cancelled_amount_s = state
                .cancelled_amount_s
                .checked_add(event.amount_cancelled)
                .ok_or_else(|| amount_overflow(event.order_hash))?;
        }
        state.updated_block = event.block_number;
        check_conservation(&state)?;

        let finished = self.funds.is_order_full_finished(&state).await?;
        state.status = if finished {
            OrderStatus::Finished
        } else {
            OrderStatus::Partial
        };
        debug!(
            order = %event.order_hash,
            cancelled_s = %state.cancelled_amount_s,
            cancelled_b = %state.cancelled_amount_b,
            status = %state.status,
            "order manager, handle order cancelled"
        );

        self.store
            .update_order_while_cancel(
                event.order_hash,
                state.status,
                state.cancelled_amount_s,
                state.cancelled_amount_b,
                state.updated_block,
            )
            .await
    }

    /// One store update invalidates the whole cohort, then the cache and
    /// record refresh.
    pub async fn handle_cutoff(&self, event: CutoffEvent) -> Result<()> {
        match self
            .store
            .settle_orders_cutoff_status(event.owner, event.cutoff)
            .await
        {
            Ok(touched) => {
                info!(owner = %event.owner, cutoff = event.cutoff, touched, "order manager, handle cutoff")
            }
            Err(err) => {
                warn!(owner = %event.owner, error = %err, "order manager, cutoff settle failed")
            }
        }
        self.cutoff_cache.add(&event).await
    }

    /// Fork events pre-empt everything else: the router quiesces before
    /// this runs.
    pub async fn handle_fork(&self, event: ForkEvent) -> Result<()> {
        let stats = self.fork_processor.process(&event).await?;
        self.accounts.reset();
        info!(
            fork_block = event.fork_block,
            orders_reverted = stats.orders_reverted,
            "order manager, fork handled"
        );
        Ok(())
    }

    fn guard_transition(&self, state: &OrderState) -> Result<()> {
        if state.status.is_terminal() || state.status == OrderStatus::Unknown {
            return Err(RelayError::IllegalTransition {
                order_hash: state.raw_order.hash,
                status: state.status,
            });
        }
        Ok(())
    }

    // ---- predicates ----

    pub fn is_order_cutoff(&self, owner: Address, create_time: u64) -> bool {
        self.cutoff_cache.is_order_cutoff(owner, create_time)
    }

    pub async fn is_order_full_finished(&self, state: &OrderState) -> Result<bool> {
        self.funds.is_order_full_finished(state).await
    }

    pub async fn is_fund_insufficient(&self, state: &OrderState) -> Result<bool> {
        self.funds.is_fund_insufficient(state).await
    }

    // ---- query interface ----

    pub async fn order_by_hash(&self, hash: B256) -> Result<OrderState> {
        self.store.order_by_hash(hash).await?.convert_up()
    }

    pub async fn orders(
        &self,
        query: &OrderQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<OrderState>> {
        let rows = self.store.order_page_query(query, page_index, page_size).await?;
        Ok(PageResult {
            data: convert_rows(rows.data, |row| row.convert_up()),
            page_index: rows.page_index,
            page_size: rows.page_size,
            total: rows.total,
        })
    }

    pub async fn fills(
        &self,
        query: &FillQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<OrderFilledEvent>> {
        let rows = self.store.fills_page_query(query, page_index, page_size).await?;
        Ok(PageResult {
            data: convert_rows(rows.data, |row| row.convert_up()),
            page_index: rows.page_index,
            page_size: rows.page_size,
            total: rows.total,
        })
    }

    pub async fn ring_mined(
        &self,
        query: &RingMinedQuery,
        page_index: usize,
        page_size: usize,
    ) -> Result<PageResult<RingMinedEvent>> {
        let rows = self
            .store
            .ring_mined_page_query(query, page_index, page_size)
            .await?;
        Ok(PageResult {
            data: convert_rows(rows.data, |row| row.convert_up()),
            page_index: rows.page_index,
            page_size: rows.page_size,
            total: rows.total,
        })
    }

    pub async fn update_broadcast_time_by_hash(&self, hash: B256, broadcast_time: i64) -> Result<()> {
        self.store.update_broadcast_time(hash, broadcast_time).await
    }
}

/// Rows that fail to decode are skipped, not fatal to the page.
fn convert_rows<R, T>(rows: Vec<R>, convert: impl Fn(&R) -> Result<T>) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match convert(row) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "order manager, skipping undecodable row");
                None
            }
        })
        .collect()
}

/// Consumed amounts never exceed the order's totals on either side.
/// A breach is fatal.
fn check_conservation(state: &OrderState) -> Result<()> {
    let consumed_s = state
        .dealt_amount_s
        .checked_add(state.cancelled_amount_s)
        .ok_or_else(|| amount_overflow(state.raw_order.hash))?;
    let consumed_b = state
        .dealt_amount_b
        .checked_add(state.cancelled_amount_b)
        .ok_or_else(|| amount_overflow(state.raw_order.hash))?;
    if consumed_s > state.raw_order.amount_s || consumed_b > state.raw_order.amount_b {
        return Err(RelayError::IntegrityViolation(format!(
            "order {} consumed more than its total: S {consumed_s}/{}, B {consumed_b}/{}",
            state.raw_order.hash, state.raw_order.amount_s, state.raw_order.amount_b
        )));
    }
    Ok(())
}

fn amount_overflow(hash: B256) -> RelayError {
    RelayError::IntegrityViolation(format!("amount overflow for order {hash}"))
}

/// Adapter registered on every router topic.
struct ManagerHandler(Arc<OrderManager>);

#[async_trait]
impl EventHandler for ManagerHandler {
    async fn handle(&self, event: ChainEvent) -> Result<()> {
        match event {
            ChainEvent::NewOrder(order) => self.0.handle_gateway_order(*order).await,
            ChainEvent::RingMined(event) => self.0.handle_ring_mined(event).await,
            ChainEvent::Filled(event) => self.0.handle_order_filled(event).await,
            ChainEvent::Cancelled(event) => self.0.handle_order_cancelled(event).await,
            ChainEvent::Cutoff(event) => self.0.handle_cutoff(event).await,
            ChainEvent::Fork(event) => self.0.handle_fork(event).await,
        }
    }
}
