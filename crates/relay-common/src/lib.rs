//! Shared domain types for the relay order manager.
//!
//! This crate contains:
//! - Order / OrderState and the order status machine
//! - Typed chain events (fills, cancels, cutoffs, ring-mined, fork)
//! - Rational token prices with overflow-free value comparison
//! - Decimal-string big-integer helpers for the persistence boundary
//!
//! CRITICAL: all monetary amounts are `alloy_primitives::U256`.
//! NEVER use floating point for financial math or comparisons.

pub mod bigint;
pub mod events;
pub mod types;

pub use bigint::{big_int_string, parse_big_int, parse_big_int_opt, BigIntError};
pub use events::{
    ApprovalEvent, Block, CutoffEvent, ForkEvent, OrderCancelledEvent, OrderFilledEvent,
    RingMinedEvent, TransferEvent,
};
pub use types::{Order, OrderError, OrderState, OrderStatus, TokenPrice};
