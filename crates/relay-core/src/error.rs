//! Unified error type for the order manager core.
//!
//! The router's dispatch policy keys off these kinds: `Duplicate` is
//! swallowed on idempotent inserts, `IllegalTransition` is logged and
//! dropped, `IntegrityViolation` halts the service. Everything else is
//! logged and processing continues.

use alloy_primitives::B256;
use relay_common::{BigIntError, OrderError, OrderStatus};

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Benign on idempotent inserts (fills, cancels, ring-mined records).
    #[error("duplicate {entity}")]
    Duplicate { entity: &'static str },

    /// An order in a terminal state received a non-fork update. Arises
    /// only from replay after an incomplete fork rollback.
    #[error("illegal transition: order {order_hash} is {status}")]
    IllegalTransition {
        order_hash: B256,
        status: OrderStatus,
    },

    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// Invariant breach. Fatal: the router halts the service.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

impl RelayError {
    /// Errors the router swallows without logging above debug level.
    pub fn is_benign(&self) -> bool {
        matches!(self, RelayError::Duplicate { .. })
    }

    /// Errors that halt the service.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::IntegrityViolation(_))
    }
}

impl From<OrderError> for RelayError {
    fn from(err: OrderError) -> Self {
        RelayError::Decode(err.to_string())
    }
}

impl From<BigIntError> for RelayError {
    fn from(err: BigIntError) -> Self {
        RelayError::Decode(err.to_string())
    }
}
