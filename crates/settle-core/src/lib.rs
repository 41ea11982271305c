//! Settlement engine.
//!
//! The public entry point external collaborators (the HTTP layer) use to
//! create, complete, fail, re-open, or refund orders. Each operation is a
//! thin composition: input validation, one ledger transition, then the
//! reconciler pushes the accepted transition into the mirror.

pub mod engine;

pub use engine::{
	CreateOrderRequest, EngineConfig, OrderView, ReadSource, SettlementEngine,
	SettlementEngineBuilder,
};
