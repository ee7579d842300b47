//! Fund checker: batched balance+allowance probes and the market-value
//! thresholds that decide "fund insufficient" and "fully finished".
//!
//! Probes are grouped by `(owner, tokenS, spender)` — the spender is the
//! protocol's registered delegate, not the settlement contract — and
//! issued as one batched RPC. A failed probe is recorded against its own
//! order only; it never poisons the rest of the batch.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use relay_common::OrderState;
use tracing::warn;

use crate::accessor::{ChainAccessor, MarketCapProvider};
use crate::error::{RelayError, Result};

pub struct FundChecker {
    accessor: Arc<dyn ChainAccessor>,
    market_cap: Arc<dyn MarketCapProvider>,
    value_threshold: U256,
}

impl FundChecker {
    pub fn new(
        accessor: Arc<dyn ChainAccessor>,
        market_cap: Arc<dyn MarketCapProvider>,
        value_threshold: U256,
    ) -> Self {
        Self {
            accessor,
            market_cap,
            value_threshold,
        }
    }

    /// Probe every order in one batched RPC and assign
    /// `available_amount_s = min(balance, allowance)`.
    ///
    /// The outer error means the batch itself failed (spender resolution
    /// or transport). The returned vector is aligned with `states`: an
    /// `Err` entry means that order's probe failed and its available
    /// amount was left untouched.
    pub async fn batch_probe(&self, states: &mut [OrderState]) -> Result<Vec<Result<()>>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let mut spenders: HashMap<Address, Address> = HashMap::new();
        for state in states.iter() {
            let protocol = state.raw_order.protocol;
            if !spenders.contains_key(&protocol) {
                let spender = self.accessor.sender_address_for(protocol).await?;
                spenders.insert(protocol, spender);
            }
        }

        let mut keys: Vec<(Address, Address, Address)> = Vec::new();
        let mut index: HashMap<(Address, Address, Address), usize> = HashMap::new();
        for state in states.iter() {
            let key = (
                state.raw_order.owner,
                state.raw_order.token_s,
                spenders[&state.raw_order.protocol],
            );
            index.entry(key).or_insert_with(|| {
                keys.push(key);
                keys.len() - 1
            });
        }

        let probes = self.accessor.batch_balance_and_allowance(&keys).await?;
        if probes.len() != keys.len() {
            return Err(RelayError::RpcUnavailable(format!(
                "batch probe returned {} results for {} keys",
                probes.len(),
                keys.len()
            )));
        }

        let mut outcomes = Vec::with_capacity(states.len());
        for state in states.iter_mut() {
            let key = (
                state.raw_order.owner,
                state.raw_order.token_s,
                spenders[&state.raw_order.protocol],
            );
            let probe = &probes[index[&key]];
            match probe.available() {
                Ok(available) => {
                    state.available_amount_s = available;
                    outcomes.push(Ok(()));
                }
                Err(err) => {
                    warn!(
                        order = %state.raw_order.hash,
                        owner = %state.raw_order.owner,
                        error = %err,
                        "fund checker, probe failed for order"
                    );
                    outcomes.push(Err(err));
                }
            }
        }
        Ok(outcomes)
    }

    /// Single-order probe on the gateway path; any failure propagates.
    pub async fn probe_one(&self, state: &mut OrderState) -> Result<()> {
        let outcomes = self.batch_probe(std::slice::from_mut(state)).await?;
        outcomes.into_iter().next().unwrap_or(Ok(()))
    }

    /// True iff `price(tokenS) * availableAmountS` is below the threshold.
    pub async fn is_fund_insufficient(&self, state: &OrderState) -> Result<bool> {
        let price = self.market_cap.price_of(state.raw_order.token_s).await?;
        Ok(price.value_below(state.available_amount_s, self.value_threshold))
    }

    /// True iff the market value of the order's remaining bounded side is
    /// below the threshold — residual dust counts as fully finished.
    pub async fn is_order_full_finished(&self, state: &OrderState) -> Result<bool> {
        is_order_full_finished(self.market_cap.as_ref(), self.value_threshold, state).await
    }
}

/// Shared by the lifecycle engine and the fork processor.
pub async fn is_order_full_finished(
    market_cap: &dyn MarketCapProvider,
    value_threshold: U256,
    state: &OrderState,
) -> Result<bool> {
    let (token, remaining) = state.remaining_bounded_side();
    let price = market_cap.price_of(token).await?;
    Ok(price.value_below(remaining, value_threshold))
}
