//! Miner feed: candidate selection for the matching engine.

use alloy_primitives::{Address, B256};
use relay_common::{OrderState, OrderStatus};
use tracing::{debug, warn};

use crate::error::Result;
use crate::manager::OrderManager;

/// Statuses never offered to miners.
const MINER_EXCLUDED_STATUS: [OrderStatus; 3] = [
    OrderStatus::Finished,
    OrderStatus::Cutoff,
    OrderStatus::Cancel,
];

impl OrderManager {
    /// Candidate orders for the matching engine, best price first.
    ///
    /// Hashes in `exclude_hashes` are the miner's "not presently useful"
    /// feedback: they are marked at the current head and reappear after
    /// `block_period` blocks. Candidates are batch fund-checked; orders
    /// whose probe errors are dropped without a mark, fund-insufficient
    /// ones are marked `head + account_period` and excluded.
    pub async fn miner_orders(
        &self,
        protocol: Address,
        token_s: Address,
        token_b: Address,
        length: usize,
        exclude_hashes: &[B256],
    ) -> Vec<OrderState> {
        let current_head = match self.store.latest_block().await {
            Ok(block) => block.block_number.max(0) as u64,
            Err(_) => 0,
        };

        if !exclude_hashes.is_empty() {
            if let Err(err) = self
                .store
                .mark_miner_orders(exclude_hashes, current_head as i64)
                .await
            {
                warn!(error = %err, "order manager, marking excluded orders failed");
            }
        }

        let mark_threshold = current_head.saturating_sub(self.options.block_period) as i64;
        let rows = match self
            .store
            .orders_for_miner(
                protocol,
                token_s,
                token_b,
                length,
                &MINER_EXCLUDED_STATUS,
                mark_threshold,
            )
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "order manager, miner order query failed");
                return Vec::new();
            }
        };

        let mut candidates: Vec<OrderState> = rows
            .iter()
            .filter_map(|row| match row.convert_up() {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(order = %row.order_hash, error = %err, "order manager, skipping undecodable order");
                    None
                }
            })
            .filter(|state| !self.whitelist.contains(state.raw_order.owner))
            .collect();
        if candidates.is_empty() {
            return candidates;
        }

        let outcomes = match self.funds.batch_probe(&mut candidates).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(error = %err, "order manager, miner orders batch probe failed");
                return Vec::new();
            }
        };

        let mut list = Vec::new();
        let mut insufficient = Vec::new();
        for (state, outcome) in candidates.into_iter().zip(outcomes) {
            if outcome.is_err() {
                // Probe error: skip silently, no mark.
                continue;
            }
            match self.funds.is_fund_insufficient(&state).await {
                Ok(true) => insufficient.push(state.raw_order.hash),
                Ok(false) => list.push(state),
                Err(err) => {
                    warn!(order = %state.raw_order.hash, error = %err, "order manager, fund check failed");
                }
            }
        }

        if !insufficient.is_empty() {
            let mark = (current_head + self.options.account_period) as i64;
            if let Err(err) = self.store.mark_miner_orders(&insufficient, mark).await {
                warn!(error = %err, "order manager, marking fund-insufficient orders failed");
            }
        }

        debug!(
            head = current_head,
            returned = list.len(),
            insufficient = insufficient.len(),
            "order manager, miner orders served"
        );
        list
    }

    /// Raw candidate list for depth queries: live orders only, price
    /// ascending, no fund check.
    pub async fn order_book(
        &self,
        protocol: Address,
        token_s: Address,
        token_b: Address,
        length: usize,
    ) -> Result<Vec<OrderState>> {
        let rows = self
            .store
            .order_book(protocol, token_s, token_b, length)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row.convert_up() {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(order = %row.order_hash, error = %err, "order manager, skipping undecodable order");
                    None
                }
            })
            .collect())
    }
}
