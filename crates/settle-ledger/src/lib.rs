//! Authoritative order ledger.
//!
//! One record per order, mutated only through the transition operations in
//! [`ledger::OrderLedger`]. The mirror store is derived from this crate's
//! state and is never consulted for decisions made here.

pub mod balances;
pub mod directory;
pub mod ledger;
pub mod proof;

pub use balances::{BalanceProvider, InMemoryBalances, TransferError};
pub use directory::{StaticVendorDirectory, VendorDirectory};
pub use ledger::{CreateOrderParams, LedgerEvent, OrderLedger};
