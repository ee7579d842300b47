//! External collaborator seams: settlement-contract reads, the market-cap
//! oracle, and the owner whitelist.
//!
//! Implementations own their per-call timeouts; a timed-out probe surfaces
//! as `RpcUnavailable`, never a silent zero.

use std::collections::HashSet;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use relay_common::TokenPrice;

use crate::error::{RelayError, Result};

/// Block tag for read calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

/// One (owner, tokenS, spender) probe in a batched balance+allowance call.
///
/// Per-item errors do not poison the batch: each field carries its own
/// result, and callers decide whether to skip or fail.
#[derive(Debug, Clone)]
pub struct Erc20Probe {
    pub owner: Address,
    pub token: Address,
    pub spender: Address,
    pub balance: Result<U256>,
    pub allowance: Result<U256>,
}

impl Erc20Probe {
    pub fn key(&self) -> (Address, Address, Address) {
        (self.owner, self.token, self.spender)
    }

    /// The amount actually sellable: `min(balance, allowance)`.
    /// Errors on either probe propagate.
    pub fn available(&self) -> Result<U256> {
        let balance = self.balance.clone()?;
        let allowance = self.allowance.clone()?;
        Ok(balance.min(allowance))
    }
}

/// Read access to the settlement contract and the chain head.
#[async_trait]
pub trait ChainAccessor: Send + Sync {
    /// Aggregate S-side amount already cancelled or filled for an order,
    /// as reported by the settlement contract.
    async fn cancelled_or_filled(
        &self,
        protocol: Address,
        order_hash: B256,
        tag: BlockTag,
    ) -> Result<U256>;

    /// The owner's current cutoff timestamp on the given protocol.
    async fn get_cutoff(&self, protocol: Address, owner: Address, tag: BlockTag) -> Result<U256>;

    async fn erc20_balance(&self, token: Address, owner: Address, tag: BlockTag) -> Result<U256>;

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        tag: BlockTag,
    ) -> Result<U256>;

    /// One batched RPC resolving balance and allowance for every
    /// (owner, token, spender) triple. The outer error means the whole
    /// batch failed; per-item failures live inside each probe.
    async fn batch_balance_and_allowance(
        &self,
        keys: &[(Address, Address, Address)],
    ) -> Result<Vec<Erc20Probe>>;

    /// The protocol's registered transfer delegate. This, not the
    /// settlement contract itself, is the allowance spender.
    /// Implementations cache the resolution.
    async fn sender_address_for(&self, protocol: Address) -> Result<Address>;

    async fn latest_block_number(&self) -> Result<u64>;
}

/// Market-value oracle: base-currency price per token unit.
#[async_trait]
pub trait MarketCapProvider: Send + Sync {
    async fn price_of(&self, token: Address) -> Result<TokenPrice>;
}

/// The whitelist predicate consulted by the miner feed.
pub trait OwnerWhitelist: Send + Sync {
    fn contains(&self, owner: Address) -> bool;
}

/// Whitelist backed by a fixed owner set from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticWhitelist {
    owners: HashSet<Address>,
}

impl StaticWhitelist {
    pub fn new(owners: impl IntoIterator<Item = Address>) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }
}

impl OwnerWhitelist for StaticWhitelist {
    fn contains(&self, owner: Address) -> bool {
        self.owners.contains(&owner)
    }
}

/// Convenience for accessor impls mapping transport failures.
pub fn rpc_error(err: impl std::fmt::Display) -> RelayError {
    RelayError::RpcUnavailable(err.to_string())
}
