//! Persisted row shapes and their domain conversions.
//!
//! Rows mirror relational columns: arbitrary-precision amounts are decimal
//! strings (empty means absent), addresses and hashes are hex strings,
//! counters are integers. `convert_down` goes domain -> row, `convert_up`
//! row -> domain with lossless parsing.

use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use relay_common::{
    big_int_string, parse_big_int, Block, CutoffEvent, Order, OrderCancelledEvent,
    OrderFilledEvent, OrderState, OrderStatus, RingMinedEvent,
};

use crate::error::{RelayError, Result};

fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s).map_err(|_| RelayError::Decode(format!("bad address: {s:?}")))
}

fn parse_hash(s: &str) -> Result<B256> {
    B256::from_str(s).map_err(|_| RelayError::Decode(format!("bad hash: {s:?}")))
}

/// One order plus its mutable state, flattened to columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRow {
    pub id: u64,
    pub protocol: String,
    pub owner: String,
    pub order_hash: String,
    pub token_s: String,
    pub token_b: String,
    pub amount_s: String,
    pub amount_b: String,
    pub timestamp: i64,
    pub ttl: i64,
    pub salt: String,
    pub lrc_fee: String,
    pub buy_no_more_than_amount_b: bool,
    pub margin_split_percentage: u8,
    pub v: u8,
    pub r: String,
    pub s: String,
    pub dealt_amount_s: String,
    pub dealt_amount_b: String,
    pub cancelled_amount_s: String,
    pub cancelled_amount_b: String,
    pub status: u8,
    pub updated_block: i64,
    pub broadcast_time: i64,
    pub miner_block_mark: i64,
    pub market: String,
    pub created_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn convert_down(state: &OrderState) -> Self {
        let order = &state.raw_order;
        Self {
            id: 0,
            protocol: order.protocol.to_string(),
            owner: order.owner.to_string(),
            order_hash: order.hash.to_string(),
            token_s: order.token_s.to_string(),
            token_b: order.token_b.to_string(),
            amount_s: big_int_string(order.amount_s),
            amount_b: big_int_string(order.amount_b),
            timestamp: order.timestamp as i64,
            ttl: order.ttl as i64,
            salt: big_int_string(order.salt),
            lrc_fee: big_int_string(order.lrc_fee),
            buy_no_more_than_amount_b: order.buy_no_more_than_amount_b,
            margin_split_percentage: order.margin_split_percentage,
            v: order.v,
            r: order.r.to_string(),
            s: order.s.to_string(),
            dealt_amount_s: big_int_string(state.dealt_amount_s),
            dealt_amount_b: big_int_string(state.dealt_amount_b),
            cancelled_amount_s: big_int_string(state.cancelled_amount_s),
            cancelled_amount_b: big_int_string(state.cancelled_amount_b),
            status: state.status.as_u8(),
            updated_block: state.updated_block as i64,
            broadcast_time: state.broadcast_time as i64,
            miner_block_mark: state.miner_block_mark as i64,
            market: order.market(),
            created_at: Utc::now(),
        }
    }

    pub fn convert_up(&self) -> Result<OrderState> {
        let raw_order = Order {
            protocol: parse_address(&self.protocol)?,
            owner: parse_address(&self.owner)?,
            hash: parse_hash(&self.order_hash)?,
            token_s: parse_address(&self.token_s)?,
            token_b: parse_address(&self.token_b)?,
            amount_s: parse_big_int(&self.amount_s)?,
            amount_b: parse_big_int(&self.amount_b)?,
            timestamp: self.timestamp as u64,
            ttl: self.ttl as u64,
            salt: parse_big_int(&self.salt)?,
            lrc_fee: parse_big_int(&self.lrc_fee)?,
            buy_no_more_than_amount_b: self.buy_no_more_than_amount_b,
            margin_split_percentage: self.margin_split_percentage,
            v: self.v,
            r: parse_hash(&self.r)?,
            s: parse_hash(&self.s)?,
        };
        Ok(OrderState {
            raw_order,
            dealt_amount_s: parse_big_int(&self.dealt_amount_s)?,
            dealt_amount_b: parse_big_int(&self.dealt_amount_b)?,
            cancelled_amount_s: parse_big_int(&self.cancelled_amount_s)?,
            cancelled_amount_b: parse_big_int(&self.cancelled_amount_b)?,
            available_amount_s: U256::ZERO,
            status: OrderStatus::from_u8(self.status),
            updated_block: self.updated_block as u64,
            broadcast_time: self.broadcast_time as u32,
            miner_block_mark: self.miner_block_mark as u64,
        })
    }

    pub(crate) fn price_key(&self) -> (U256, U256, i64) {
        let amount_s = parse_big_int(&self.amount_s).unwrap_or(U256::ZERO);
        let amount_b = parse_big_int(&self.amount_b).unwrap_or(U256::ZERO);
        (amount_s, amount_b, self.timestamp)
    }
}

/// One fill event. Unique on `(ringhash, order_hash)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRow {
    pub id: u64,
    pub ringhash: String,
    pub order_hash: String,
    pub ring_index: String,
    pub amount_s: String,
    pub amount_b: String,
    pub lrc_fee: String,
    pub lrc_reward: String,
    pub split_s: String,
    pub split_b: String,
    pub block_number: i64,
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
}

impl FillRow {
    pub fn convert_down(event: &OrderFilledEvent) -> Self {
        Self {
            id: 0,
            ringhash: event.ringhash.to_string(),
            order_hash: event.order_hash.to_string(),
            ring_index: big_int_string(event.ring_index),
            amount_s: big_int_string(event.amount_s),
            amount_b: big_int_string(event.amount_b),
            lrc_fee: big_int_string(event.lrc_fee),
            lrc_reward: big_int_string(event.lrc_reward),
            split_s: big_int_string(event.split_s),
            split_b: big_int_string(event.split_b),
            block_number: event.block_number as i64,
            tx_hash: event.tx_hash.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn convert_up(&self) -> Result<OrderFilledEvent> {
        Ok(OrderFilledEvent {
            ringhash: parse_hash(&self.ringhash)?,
            order_hash: parse_hash(&self.order_hash)?,
            ring_index: parse_big_int(&self.ring_index)?,
            amount_s: parse_big_int(&self.amount_s)?,
            amount_b: parse_big_int(&self.amount_b)?,
            lrc_fee: parse_big_int(&self.lrc_fee)?,
            lrc_reward: parse_big_int(&self.lrc_reward)?,
            split_s: parse_big_int(&self.split_s)?,
            split_b: parse_big_int(&self.split_b)?,
            block_number: self.block_number as u64,
            tx_hash: parse_hash(&self.tx_hash)?,
        })
    }
}

/// One cancel event. Unique on `(order_hash, tx_hash)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRow {
    pub id: u64,
    pub order_hash: String,
    pub amount_cancelled: String,
    pub block_number: i64,
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
}

impl CancelRow {
    pub fn convert_down(event: &OrderCancelledEvent) -> Self {
        Self {
            id: 0,
            order_hash: event.order_hash.to_string(),
            amount_cancelled: big_int_string(event.amount_cancelled),
            block_number: event.block_number as i64,
            tx_hash: event.tx_hash.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn convert_up(&self) -> Result<OrderCancelledEvent> {
        Ok(OrderCancelledEvent {
            order_hash: parse_hash(&self.order_hash)?,
            amount_cancelled: parse_big_int(&self.amount_cancelled)?,
            block_number: self.block_number as u64,
            tx_hash: parse_hash(&self.tx_hash)?,
        })
    }
}

/// One ring-mined record. Unique on `ring_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingMinedRow {
    pub id: u64,
    pub ring_index: String,
    pub ringhash: String,
    pub miner: String,
    pub fee_recipient: String,
    pub block_number: i64,
    pub tx_hash: String,
    pub time: i64,
    pub created_at: DateTime<Utc>,
}

impl RingMinedRow {
    pub fn convert_down(event: &RingMinedEvent) -> Self {
        Self {
            id: 0,
            ring_index: big_int_string(event.ring_index),
            ringhash: event.ringhash.to_string(),
            miner: event.miner.to_string(),
            fee_recipient: event.fee_recipient.to_string(),
            block_number: event.block_number as i64,
            tx_hash: event.tx_hash.to_string(),
            time: event.time as i64,
            created_at: Utc::now(),
        }
    }

    pub fn convert_up(&self) -> Result<RingMinedEvent> {
        Ok(RingMinedEvent {
            ring_index: parse_big_int(&self.ring_index)?,
            ringhash: parse_hash(&self.ringhash)?,
            miner: parse_address(&self.miner)?,
            fee_recipient: parse_address(&self.fee_recipient)?,
            block_number: self.block_number as u64,
            tx_hash: parse_hash(&self.tx_hash)?,
            time: self.time as u64,
        })
    }
}

/// Highest cutoff per owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoffRow {
    pub id: u64,
    pub owner: String,
    pub cutoff: i64,
    pub block_number: i64,
    pub created_at: DateTime<Utc>,
}

impl CutoffRow {
    pub fn convert_down(event: &CutoffEvent) -> Self {
        Self {
            id: 0,
            owner: event.owner.to_string(),
            cutoff: event.cutoff as i64,
            block_number: event.block_number as i64,
            created_at: Utc::now(),
        }
    }

    pub fn owner_address(&self) -> Result<Address> {
        parse_address(&self.owner)
    }
}

/// One observed chain block. Unique on `block_hash` and on `parent_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub id: u64,
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub create_time: i64,
    pub fork: bool,
    pub created_at: DateTime<Utc>,
}

impl BlockRow {
    pub fn convert_down(block: &Block) -> Self {
        Self {
            id: 0,
            block_number: block.number as i64,
            block_hash: block.hash.to_string(),
            parent_hash: block.parent_hash.to_string(),
            create_time: block.create_time as i64,
            fork: block.fork,
            created_at: Utc::now(),
        }
    }

    pub fn convert_up(&self) -> Result<Block> {
        Ok(Block {
            number: self.block_number as u64,
            hash: parse_hash(&self.block_hash)?,
            parent_hash: parse_hash(&self.parent_hash)?,
            create_time: self.create_time as u64,
            fork: self.fork,
        })
    }
}
