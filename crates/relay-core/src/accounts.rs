//! Process-wide mirror of per-owner token balances and allowances.
//!
//! Entries are populated lazily on lookup and adjusted by Transfer and
//! Approval events. An event whose block number is below the manager's
//! high-water mark signals a likely reorg: the whole cache is flushed
//! atomically and the mark drops to a sentinel so the next events
//! repopulate everything.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use relay_common::{ApprovalEvent, TransferEvent};
use tracing::info;

use crate::accessor::{BlockTag, ChainAccessor};
use crate::error::Result;

#[derive(Debug, Default, Clone)]
struct AccountEntry {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

#[derive(Debug)]
struct AccountCache {
    accounts: HashMap<Address, AccountEntry>,
    /// Highest applied event block; <= 0 forces repopulation.
    newest_block: i64,
}

pub struct AccountManager {
    accessor: Arc<dyn ChainAccessor>,
    inner: Mutex<AccountCache>,
}

impl AccountManager {
    pub fn new(accessor: Arc<dyn ChainAccessor>, head_block: u64) -> Self {
        Self {
            accessor,
            inner: Mutex::new(AccountCache {
                accounts: HashMap::new(),
                newest_block: head_block as i64,
            }),
        }
    }

    /// Cached balance, probing the chain on a miss.
    pub async fn balance(&self, token: Address, owner: Address) -> Result<U256> {
        if let Some(balance) = self
            .inner
            .lock()
            .accounts
            .get(&owner)
            .and_then(|entry| entry.balances.get(&token).copied())
        {
            return Ok(balance);
        }
        let balance = self
            .accessor
            .erc20_balance(token, owner, BlockTag::Latest)
            .await?;
        self.inner
            .lock()
            .accounts
            .entry(owner)
            .or_default()
            .balances
            .insert(token, balance);
        Ok(balance)
    }

    /// Cached allowance, probing the chain on a miss.
    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        if let Some(allowance) = self
            .inner
            .lock()
            .accounts
            .get(&owner)
            .and_then(|entry| entry.allowances.get(&(token, spender)).copied())
        {
            return Ok(allowance);
        }
        let allowance = self
            .accessor
            .erc20_allowance(token, owner, spender, BlockTag::Latest)
            .await?;
        self.inner
            .lock()
            .accounts
            .entry(owner)
            .or_default()
            .allowances
            .insert((token, spender), allowance);
        Ok(allowance)
    }

    /// The owner's cutoff as reported by the settlement contract; used by
    /// the external account query layer.
    pub async fn cutoff_of(&self, protocol: Address, owner: Address) -> Result<u64> {
        let cutoff = self
            .accessor
            .get_cutoff(protocol, owner, BlockTag::Latest)
            .await?;
        Ok(cutoff.saturating_to::<u64>())
    }

    /// Mirror a transfer: subtract from the sender, add to the receiver.
    /// Only cached accounts are touched; misses repopulate lazily.
    pub fn on_transfer(&self, event: &TransferEvent) {
        let mut inner = self.inner.lock();
        if (event.block_number as i64) < inner.newest_block {
            info!(
                event_block = event.block_number,
                newest_block = inner.newest_block,
                "account manager, block regressed, flushing cache"
            );
            Self::flush(&mut inner);
            return;
        }
        inner.newest_block = event.block_number as i64;

        if let Some(entry) = inner.accounts.get_mut(&event.from) {
            if let Some(balance) = entry.balances.get_mut(&event.token) {
                *balance = balance.saturating_sub(event.value);
            }
        }
        if let Some(entry) = inner.accounts.get_mut(&event.to) {
            if let Some(balance) = entry.balances.get_mut(&event.token) {
                *balance = balance.saturating_add(event.value);
            }
        }
    }

    /// Mirror an approval for a cached owner.
    pub fn on_approval(&self, event: &ApprovalEvent) {
        let mut inner = self.inner.lock();
        if (event.block_number as i64) < inner.newest_block {
            info!(
                event_block = event.block_number,
                newest_block = inner.newest_block,
                "account manager, block regressed, flushing cache"
            );
            Self::flush(&mut inner);
            return;
        }
        inner.newest_block = event.block_number as i64;

        if let Some(entry) = inner.accounts.get_mut(&event.owner) {
            entry
                .allowances
                .insert((event.token, event.spender), event.value);
        }
    }

    /// Drop everything; called by the fork processor.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        Self::flush(&mut inner);
    }

    fn flush(inner: &mut AccountCache) {
        inner.accounts.clear();
        inner.newest_block = -1;
    }

    #[cfg(test)]
    fn cached_balance(&self, token: Address, owner: Address) -> Option<U256> {
        self.inner
            .lock()
            .accounts
            .get(&owner)
            .and_then(|entry| entry.balances.get(&token).copied())
    }
}
