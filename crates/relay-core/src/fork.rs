//! Fork processor: rolls order state back to the fork point by inverting
//! every recorded fill and cancel above it.
//!
//! Correctness rests on the amount deltas being associative and recorded
//! with their source block, so the inversion is deterministic: subtract
//! each event's contribution, delete the event row, recompute status.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{B256, U256};
use relay_common::{ForkEvent, OrderStatus};
use tracing::{info, warn};

use crate::accessor::MarketCapProvider;
use crate::error::{RelayError, Result};
use crate::funds::is_order_full_finished;
use crate::store::OrderStore;

/// Summary of one rollback, for the log line and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkStats {
    pub forked_blocks: u64,
    pub fills_removed: usize,
    pub cancels_removed: usize,
    pub orders_reverted: usize,
}

#[derive(Default)]
struct Inversion {
    dealt_s: U256,
    dealt_b: U256,
    cancelled: U256,
}

pub struct ForkProcessor {
    store: Arc<dyn OrderStore>,
    market_cap: Arc<dyn MarketCapProvider>,
    value_threshold: U256,
}

impl ForkProcessor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        market_cap: Arc<dyn MarketCapProvider>,
        value_threshold: U256,
    ) -> Self {
        Self {
            store,
            market_cap,
            value_threshold,
        }
    }

    /// Roll everything above `event.fork_block` back out of the order
    /// table. Runs with the router quiesced.
    pub async fn process(&self, event: &ForkEvent) -> Result<ForkStats> {
        let fork_block = event.fork_block;
        info!(
            fork_block,
            new_head = event.new_head_block,
            "fork processor, rolling back"
        );

        let forked_blocks = self.store.mark_blocks_forked_above(fork_block).await?;
        let fills = self.store.fills_above_block(fork_block).await?;
        let cancels = self.store.cancels_above_block(fork_block).await?;

        let mut deltas: HashMap<B256, Inversion> = HashMap::new();
        let mut fill_keys = Vec::with_capacity(fills.len());
        let mut cancel_keys = Vec::with_capacity(cancels.len());

        for row in &fills {
            let fill = row.convert_up()?;
            let delta = deltas.entry(fill.order_hash).or_default();
            delta.dealt_s = delta
                .dealt_s
                .checked_add(fill.amount_s)
                .ok_or_else(|| overflow(fill.order_hash))?;
            delta.dealt_b = delta
                .dealt_b
                .checked_add(fill.amount_b)
                .ok_or_else(|| overflow(fill.order_hash))?;
            fill_keys.push((fill.ringhash, fill.order_hash));
        }
        for row in &cancels {
            let cancel = row.convert_up()?;
            let delta = deltas.entry(cancel.order_hash).or_default();
            delta.cancelled = delta
                .cancelled
                .checked_add(cancel.amount_cancelled)
                .ok_or_else(|| overflow(cancel.order_hash))?;
            cancel_keys.push((cancel.order_hash, cancel.tx_hash));
        }

        let mut orders_reverted = 0;
        for (hash, delta) in &deltas {
            let row = match self.store.order_by_hash(*hash).await {
                Ok(row) => row,
                Err(RelayError::NotFound(_)) => {
                    warn!(order = %hash, "fork processor, event above fork for unknown order");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let mut state = row.convert_up()?;

            state.dealt_amount_s = state
                .dealt_amount_s
                .checked_sub(delta.dealt_s)
                .ok_or_else(|| underflow(*hash))?;
            state.dealt_amount_b = state
                .dealt_amount_b
                .checked_sub(delta.dealt_b)
                .ok_or_else(|| underflow(*hash))?;
            if !delta.cancelled.is_zero() {
                if state.raw_order.buy_no_more_than_amount_b {
                    state.cancelled_amount_b = state
                        .cancelled_amount_b
                        .checked_sub(delta.cancelled)
                        .ok_or_else(|| underflow(*hash))?;
                } else {
                    state.cancelled_amount_s = state
                        .cancelled_amount_s
                        .checked_sub(delta.cancelled)
                        .ok_or_else(|| underflow(*hash))?;
                }
            }
            state.updated_block = fork_block;

            // Cutoff records are not inverted, so a CUTOFF order stays
            // absorbed. Everything else re-derives from the amounts.
            if state.status != OrderStatus::Cutoff {
                let finished = is_order_full_finished(
                    self.market_cap.as_ref(),
                    self.value_threshold,
                    &state,
                )
                .await?;
                state.status = if finished {
                    OrderStatus::Finished
                } else if state.has_progress() {
                    OrderStatus::Partial
                } else {
                    OrderStatus::New
                };
            }

            self.store
                .update_order_while_rollback(
                    *hash,
                    state.status,
                    state.dealt_amount_s,
                    state.dealt_amount_b,
                    state.cancelled_amount_s,
                    state.cancelled_amount_b,
                    state.updated_block,
                )
                .await?;
            orders_reverted += 1;
        }

        for (ringhash, order_hash) in &fill_keys {
            self.store.delete_fill(*ringhash, *order_hash).await?;
        }
        for (order_hash, tx_hash) in &cancel_keys {
            self.store.delete_cancel(*order_hash, *tx_hash).await?;
        }

        let stats = ForkStats {
            forked_blocks,
            fills_removed: fill_keys.len(),
            cancels_removed: cancel_keys.len(),
            orders_reverted,
        };
        info!(
            forked_blocks = stats.forked_blocks,
            fills_removed = stats.fills_removed,
            cancels_removed = stats.cancels_removed,
            orders_reverted = stats.orders_reverted,
            "fork processor, rollback complete"
        );
        Ok(stats)
    }
}

fn overflow(hash: B256) -> RelayError {
    RelayError::IntegrityViolation(format!("fork inversion overflow for order {hash}"))
}

fn underflow(hash: B256) -> RelayError {
    RelayError::IntegrityViolation(format!(
        "fork inversion underflow for order {hash}: recorded events exceed state"
    ))
}
