//! Order manager core for a decentralized-exchange relay.
//!
//! Ingests signed off-chain orders from the P2P gateway, mirrors every
//! on-chain settlement event affecting them, and serves the matching
//! engine a live, filtered view of orders that are both economically
//! viable and currently fundable.
//!
//! ## Modules
//!
//! - `router`: topic-partitioned event dispatch with fork quiesce
//! - `manager`: the order lifecycle engine, miner feed and query surface
//! - `store`: the persistence contract and an in-memory reference impl
//! - `funds`: batched balance/allowance probes and value thresholds
//! - `fork`: chain-reorg rollback by event inversion
//! - `accounts`: per-owner balance/allowance mirror
//! - `cutoff`: write-through owner cutoff cache
//! - `accessor`: settlement-contract, oracle and whitelist seams
//! - `config`: TOML configuration with env overrides

pub mod accessor;
pub mod accounts;
pub mod config;
pub mod cutoff;
pub mod error;
pub mod fork;
pub mod funds;
pub mod manager;
pub mod router;
pub mod store;

pub use accessor::{
    BlockTag, ChainAccessor, Erc20Probe, MarketCapProvider, OwnerWhitelist, StaticWhitelist,
};
pub use accounts::AccountManager;
pub use config::{OrderManagerOptions, RelayConfig, WhitelistConfig};
pub use cutoff::CutoffCache;
pub use error::{RelayError, Result};
pub use fork::{ForkProcessor, ForkStats};
pub use funds::FundChecker;
pub use manager::OrderManager;
pub use router::{ChainEvent, EventHandler, EventRouter, Topic};
pub use store::{
    BlockRow, CancelRow, CutoffRow, FillQuery, FillRow, InMemoryStore, OrderQuery, OrderRow,
    OrderStore, PageResult, RingMinedQuery, RingMinedRow,
};
