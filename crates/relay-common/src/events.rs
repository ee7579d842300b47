//! Typed chain events delivered by the log extractor.
//!
//! Every event carries at least the block number and transaction hash of
//! its origin; the fork event carries the two block heights that define
//! the rollback window.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A ring settled on-chain. Purely archival for the order manager; the
/// per-order effects arrive as [`OrderFilledEvent`]s alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RingMinedEvent {
    pub ring_index: U256,
    pub ringhash: B256,
    pub miner: Address,
    pub fee_recipient: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    /// Block time, seconds.
    pub time: u64,
}

/// A ring consumed part of one order.
///
/// Keyed uniquely by `(ringhash, order_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilledEvent {
    pub ringhash: B256,
    pub order_hash: B256,
    pub ring_index: U256,
    pub amount_s: U256,
    pub amount_b: U256,
    pub lrc_fee: U256,
    pub lrc_reward: U256,
    pub split_s: U256,
    pub split_b: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// A cancellation recorded on-chain.
///
/// `amount_cancelled` is the delta for this transaction; keyed uniquely by
/// `(order_hash, tx_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledEvent {
    pub order_hash: B256,
    pub amount_cancelled: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// An owner moved their cutoff timestamp. Orders created strictly before
/// the cutoff are invalidated as a cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutoffEvent {
    pub owner: Address,
    /// Cutoff timestamp, seconds.
    pub cutoff: u64,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// ERC20 transfer touching a mirrored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// ERC20 approval touching a mirrored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// A chain reorganization orphaned every block above `fork_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkEvent {
    /// Highest block shared by both chains; state rolls back to here.
    pub fork_block: u64,
    /// Head of the chain that replaced the orphaned one.
    pub new_head_block: u64,
}

/// A chain block as observed by the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    /// Block time, seconds.
    pub create_time: u64,
    /// Marks blocks orphaned by a fork.
    pub fork: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_event_json_shape() {
        let event = OrderFilledEvent {
            ringhash: B256::with_last_byte(1),
            order_hash: B256::with_last_byte(2),
            ring_index: U256::from(3u64),
            amount_s: U256::from(400u64),
            amount_b: U256::from(4u64),
            lrc_fee: U256::from(1u64),
            lrc_reward: U256::ZERO,
            split_s: U256::ZERO,
            split_b: U256::ZERO,
            block_number: 101,
            tx_hash: B256::with_last_byte(9),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"orderHash\""));
        assert!(json.contains("\"blockNumber\":101"));
        let back: OrderFilledEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
