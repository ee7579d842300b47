//! Order types and the order status machine.

use std::cmp::Ordering;

use alloy_primitives::{aliases::U512, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Reasons an order fails structural validation at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order amountS is zero")]
    ZeroAmountS,
    #[error("order amountB is zero")]
    ZeroAmountB,
    #[error("margin split percentage {0} exceeds 100")]
    MarginSplitTooLarge(u8),
    #[error("order expired at {expire_at}, now {now}")]
    Expired { expire_at: u64, now: u64 },
}

/// Lifecycle status of an order.
///
/// FINISHED, CANCEL and CUTOFF are absorbing: once entered, the only legal
/// further update is a fork-driven rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    New,
    Partial,
    Finished,
    Cancel,
    Cutoff,
    Unknown,
}

impl OrderStatus {
    /// Terminal states reject every non-fork mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Finished | OrderStatus::Cancel | OrderStatus::Cutoff
        )
    }

    /// Numeric form used by the persisted rows.
    pub fn as_u8(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Partial => 1,
            OrderStatus::Finished => 2,
            OrderStatus::Cancel => 3,
            OrderStatus::Cutoff => 4,
            OrderStatus::Unknown => 255,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => OrderStatus::New,
            1 => OrderStatus::Partial,
            2 => OrderStatus::Finished,
            3 => OrderStatus::Cancel,
            4 => OrderStatus::Cutoff,
            _ => OrderStatus::Unknown,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "new"),
            OrderStatus::Partial => write!(f, "partial"),
            OrderStatus::Finished => write!(f, "finished"),
            OrderStatus::Cancel => write!(f, "cancel"),
            OrderStatus::Cutoff => write!(f, "cutoff"),
            OrderStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A signed off-chain intent to trade `amount_s` of `token_s` for
/// `amount_b` of `token_b`.
///
/// The hash comes from the settlement contract's canonical encoding and is
/// treated as opaque; it is never recomputed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub protocol: Address,
    pub owner: Address,
    pub hash: B256,
    pub token_s: Address,
    pub token_b: Address,
    pub amount_s: U256,
    pub amount_b: U256,
    /// Creation time, seconds.
    pub timestamp: u64,
    /// Seconds until expiry, counted from `timestamp`.
    pub ttl: u64,
    pub salt: U256,
    pub lrc_fee: U256,
    pub buy_no_more_than_amount_b: bool,
    /// 0..=100.
    pub margin_split_percentage: u8,
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl Order {
    /// Expiry time in seconds.
    pub fn expire_at(&self) -> u64 {
        self.timestamp.saturating_add(self.ttl)
    }

    /// Structural validation applied before the order touches any state.
    pub fn validate(&self, now: u64) -> Result<(), OrderError> {
        if self.amount_s.is_zero() {
            return Err(OrderError::ZeroAmountS);
        }
        if self.amount_b.is_zero() {
            return Err(OrderError::ZeroAmountB);
        }
        if self.margin_split_percentage > 100 {
            return Err(OrderError::MarginSplitTooLarge(self.margin_split_percentage));
        }
        let expire_at = self.expire_at();
        if expire_at < now {
            return Err(OrderError::Expired { expire_at, now });
        }
        Ok(())
    }

    /// Market label for the token pair, used by the paged query interface.
    pub fn market(&self) -> String {
        format!("{}-{}", self.token_b, self.token_s)
    }
}

/// Ascending price order (`amount_s / amount_b`), ties broken by earliest
/// creation time. Cross-multiplied in 512 bits so it never overflows and
/// never touches floating point.
pub fn price_cmp(a: &Order, b: &Order) -> Ordering {
    let lhs: U512 = a.amount_s.widening_mul(b.amount_b);
    let rhs: U512 = b.amount_s.widening_mul(a.amount_b);
    lhs.cmp(&rhs).then(a.timestamp.cmp(&b.timestamp))
}

/// The mutable shell around an [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    pub raw_order: Order,
    /// Cumulative filled amounts. Monotone non-decreasing outside forks.
    pub dealt_amount_s: U256,
    pub dealt_amount_b: U256,
    /// Cumulative cancelled amounts. Monotone non-decreasing outside forks.
    pub cancelled_amount_s: U256,
    pub cancelled_amount_b: U256,
    /// min(balance, allowance) from the most recent fund probe.
    pub available_amount_s: U256,
    pub status: OrderStatus,
    /// Last chain block that touched this order.
    pub updated_block: u64,
    /// P2P re-broadcast counter.
    pub broadcast_time: u32,
    /// Block height below which miners must not re-consider this order.
    pub miner_block_mark: u64,
}

impl OrderState {
    /// Fresh state for a gateway-ingested order.
    pub fn new(raw_order: Order, updated_block: u64) -> Self {
        Self {
            raw_order,
            dealt_amount_s: U256::ZERO,
            dealt_amount_b: U256::ZERO,
            cancelled_amount_s: U256::ZERO,
            cancelled_amount_b: U256::ZERO,
            available_amount_s: U256::ZERO,
            status: OrderStatus::New,
            updated_block,
            broadcast_time: 0,
            miner_block_mark: 0,
        }
    }

    /// S-side amount not yet consumed by fills or cancels.
    pub fn remaining_amount_s(&self) -> U256 {
        self.raw_order
            .amount_s
            .saturating_sub(self.dealt_amount_s.saturating_add(self.cancelled_amount_s))
    }

    /// B-side amount not yet consumed by fills or cancels.
    pub fn remaining_amount_b(&self) -> U256 {
        self.raw_order
            .amount_b
            .saturating_sub(self.dealt_amount_b.saturating_add(self.cancelled_amount_b))
    }

    /// The remaining amount on the side the order is bounded by, and the
    /// token it is denominated in.
    pub fn remaining_bounded_side(&self) -> (Address, U256) {
        if self.raw_order.buy_no_more_than_amount_b {
            (self.raw_order.token_b, self.remaining_amount_b())
        } else {
            (self.raw_order.token_s, self.remaining_amount_s())
        }
    }

    /// True once any fill or cancel has been recorded.
    pub fn has_progress(&self) -> bool {
        !self.dealt_amount_s.is_zero()
            || !self.dealt_amount_b.is_zero()
            || !self.cancelled_amount_s.is_zero()
            || !self.cancelled_amount_b.is_zero()
    }
}

/// Rational price of a token: `num / den` base-currency units per token
/// unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub num: U256,
    pub den: U256,
}

impl TokenPrice {
    /// A zero denominator is normalized to 1; prices are never divisors of
    /// zero.
    pub fn new(num: U256, den: U256) -> Self {
        let den = if den.is_zero() { U256::from(1u64) } else { den };
        Self { num, den }
    }

    /// Whole base-currency units per token unit.
    pub fn per_unit(units: u64) -> Self {
        Self::new(U256::from(units), U256::from(1u64))
    }

    /// True iff `amount * price < threshold` base-currency units.
    ///
    /// Cross-multiplied in 512 bits: `amount * num < threshold * den`.
    pub fn value_below(&self, amount: U256, threshold: U256) -> bool {
        let lhs: U512 = amount.widening_mul(self.num);
        let rhs: U512 = threshold.widening_mul(self.den);
        lhs < rhs
    }
}
