//! Shared mocks and fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{address, Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_common::{
    Block, CutoffEvent, Order, OrderCancelledEvent, OrderFilledEvent, TokenPrice,
};
use relay_core::{
    AccountManager, BlockRow, BlockTag, ChainAccessor, Erc20Probe, InMemoryStore,
    MarketCapProvider, OrderManager, OrderManagerOptions, OrderStore, RelayError, Result,
    StaticWhitelist,
};

pub const PROTOCOL: Address = address!("0x1111111111111111111111111111111111111111");
pub const OWNER: Address = address!("0x2222222222222222222222222222222222222222");
pub const TOKEN_S: Address = address!("0x3333333333333333333333333333333333333333");
pub const TOKEN_B: Address = address!("0x4444444444444444444444444444444444444444");
pub const SPENDER: Address = address!("0x9999999999999999999999999999999999999999");

/// A ttl long enough that fixture timestamps far in the past still pass
/// the expiry check against wall time.
pub const LONG_TTL: u64 = 100_000_000_000;

/// Scripted settlement-contract reads.
pub struct MockChain {
    pub balances: Mutex<HashMap<(Address, Address), U256>>,
    pub allowances: Mutex<HashMap<(Address, Address, Address), U256>>,
    pub cancelled_or_filled: Mutex<HashMap<B256, U256>>,
    pub failing_owners: Mutex<HashSet<Address>>,
    pub head: Mutex<u64>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            allowances: Mutex::new(HashMap::new()),
            cancelled_or_filled: Mutex::new(HashMap::new()),
            failing_owners: Mutex::new(HashSet::new()),
            head: Mutex::new(head),
        }
    }

    /// Give `owner` a TOKEN_S balance and allowance toward SPENDER.
    pub fn fund(&self, owner: Address, balance: u64, allowance: u64) {
        self.balances
            .lock()
            .insert((TOKEN_S, owner), U256::from(balance));
        self.allowances
            .lock()
            .insert((TOKEN_S, owner, SPENDER), U256::from(allowance));
    }

    pub fn set_cancelled_or_filled(&self, order_hash: B256, amount: u64) {
        self.cancelled_or_filled
            .lock()
            .insert(order_hash, U256::from(amount));
    }

    pub fn fail_owner(&self, owner: Address) {
        self.failing_owners.lock().insert(owner);
    }
}

#[async_trait]
impl ChainAccessor for MockChain {
    async fn cancelled_or_filled(
        &self,
        _protocol: Address,
        order_hash: B256,
        _tag: BlockTag,
    ) -> Result<U256> {
        Ok(self
            .cancelled_or_filled
            .lock()
            .get(&order_hash)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn get_cutoff(&self, _protocol: Address, _owner: Address, _tag: BlockTag) -> Result<U256> {
        Ok(U256::ZERO)
    }

    async fn erc20_balance(&self, token: Address, owner: Address, _tag: BlockTag) -> Result<U256> {
        Ok(self
            .balances
            .lock()
            .get(&(token, owner))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        _tag: BlockTag,
    ) -> Result<U256> {
        Ok(self
            .allowances
            .lock()
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn batch_balance_and_allowance(
        &self,
        keys: &[(Address, Address, Address)],
    ) -> Result<Vec<Erc20Probe>> {
        let mut probes = Vec::with_capacity(keys.len());
        for &(owner, token, spender) in keys {
            if self.failing_owners.lock().contains(&owner) {
                probes.push(Erc20Probe {
                    owner,
                    token,
                    spender,
                    balance: Err(RelayError::RpcUnavailable("probe timeout".into())),
                    allowance: Err(RelayError::RpcUnavailable("probe timeout".into())),
                });
                continue;
            }
            probes.push(Erc20Probe {
                owner,
                token,
                spender,
                balance: self.erc20_balance(token, owner, BlockTag::Latest).await,
                allowance: self
                    .erc20_allowance(token, owner, spender, BlockTag::Latest)
                    .await,
            });
        }
        Ok(probes)
    }

    async fn sender_address_for(&self, _protocol: Address) -> Result<Address> {
        Ok(SPENDER)
    }

    async fn latest_block_number(&self) -> Result<u64> {
        Ok(*self.head.lock())
    }
}

/// Every token is worth exactly one base unit per token unit.
pub struct UnitOracle;

#[async_trait]
impl MarketCapProvider for UnitOracle {
    async fn price_of(&self, _token: Address) -> Result<TokenPrice> {
        Ok(TokenPrice::per_unit(1))
    }
}

pub struct TestRig {
    pub store: Arc<InMemoryStore>,
    pub chain: Arc<MockChain>,
    pub accounts: Arc<AccountManager>,
    pub manager: Arc<OrderManager>,
}

pub fn rig() -> TestRig {
    rig_with(OrderManagerOptions::default())
}

pub fn rig_with(options: OrderManagerOptions) -> TestRig {
    let store = Arc::new(InMemoryStore::new());
    let chain = Arc::new(MockChain::new(100));
    let accounts = Arc::new(AccountManager::new(chain.clone(), 100));
    let manager = OrderManager::new(
        options,
        store.clone(),
        chain.clone(),
        Arc::new(UnitOracle),
        Arc::new(StaticWhitelist::default()),
        accounts.clone(),
    );
    TestRig {
        store,
        chain,
        accounts,
        manager,
    }
}

impl TestRig {
    /// Record a chain block so the miner feed sees a head.
    pub async fn observe_block(&self, number: u64) {
        *self.chain.head.lock() = number;
        let block = Block {
            number,
            hash: B256::with_last_byte(number as u8),
            parent_hash: B256::with_last_byte(number.wrapping_sub(1) as u8),
            create_time: 1_700_000_000 + number,
            fork: false,
        };
        self.store
            .insert_block(BlockRow::convert_down(&block))
            .await
            .unwrap();
    }

    /// Whether the block recorded by `observe_block(number)` carries the
    /// fork flag.
    pub async fn store_block_fork(&self, number: u64) -> bool {
        self.store
            .block_by_hash(B256::with_last_byte(number as u8))
            .await
            .unwrap()
            .fork
    }
}

pub fn order(hash_byte: u8, amount_s: u64, amount_b: u64, timestamp: u64) -> Order {
    order_for(OWNER, hash_byte, amount_s, amount_b, timestamp)
}

pub fn order_for(owner: Address, hash_byte: u8, amount_s: u64, amount_b: u64, timestamp: u64) -> Order {
    Order {
        protocol: PROTOCOL,
        owner,
        hash: B256::with_last_byte(hash_byte),
        token_s: TOKEN_S,
        token_b: TOKEN_B,
        amount_s: U256::from(amount_s),
        amount_b: U256::from(amount_b),
        timestamp,
        ttl: LONG_TTL,
        salt: U256::from(7u64),
        lrc_fee: U256::from(5u64),
        buy_no_more_than_amount_b: false,
        margin_split_percentage: 50,
        v: 27,
        r: B256::with_last_byte(0xbb),
        s: B256::with_last_byte(0xcc),
    }
}

pub fn fill(
    ring_byte: u8,
    order_hash: B256,
    amount_s: u64,
    amount_b: u64,
    block: u64,
) -> OrderFilledEvent {
    OrderFilledEvent {
        ringhash: B256::with_last_byte(ring_byte),
        order_hash,
        ring_index: U256::from(ring_byte),
        amount_s: U256::from(amount_s),
        amount_b: U256::from(amount_b),
        lrc_fee: U256::from(1u64),
        lrc_reward: U256::ZERO,
        split_s: U256::ZERO,
        split_b: U256::ZERO,
        block_number: block,
        tx_hash: B256::with_last_byte(ring_byte.wrapping_add(0x80)),
    }
}

pub fn cancel(tx_byte: u8, order_hash: B256, amount: u64, block: u64) -> OrderCancelledEvent {
    OrderCancelledEvent {
        order_hash,
        amount_cancelled: U256::from(amount),
        block_number: block,
        tx_hash: B256::with_last_byte(tx_byte),
    }
}

pub fn cutoff(owner: Address, cutoff: u64, block: u64) -> CutoffEvent {
    CutoffEvent {
        owner,
        cutoff,
        block_number: block,
        tx_hash: B256::with_last_byte(0xdd),
    }
}
