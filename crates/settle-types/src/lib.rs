//! Core types for the settlement system.
//!
//! This crate defines the order data model, actor/authorization types,
//! and the error taxonomy shared by every other crate in the workspace.

pub mod actor;
pub mod errors;
pub mod order;

pub use actor::{Actor, Role};
pub use errors::{Operation, Result, SettleError};
pub use order::{Order, OrderId, OrderStatus, PaymentMode};
