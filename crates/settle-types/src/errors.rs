//! Error taxonomy for the settlement system.

use crate::order::{OrderId, OrderStatus};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettleError>;

/// The state-machine edge an error occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Create,
	Complete,
	Fail,
	Reopen,
	Refund,
	Query,
	UpdatePolicy,
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Operation::Create => "create",
			Operation::Complete => "complete",
			Operation::Fail => "fail",
			Operation::Reopen => "reopen",
			Operation::Refund => "refund",
			Operation::Query => "query",
			Operation::UpdatePolicy => "update-policy",
		};
		f.write_str(s)
	}
}

#[derive(Error, Debug)]
pub enum SettleError {
	/// Malformed input, rejected before the ledger is touched. The caller
	/// can resubmit corrected input.
	#[error("{operation}: validation failed: {reason}")]
	Validation { operation: Operation, reason: String },

	/// Wrong actor for the transition. Deliberately says nothing about the
	/// order's current state.
	#[error("{operation} on order {order_id}: not permitted")]
	Permission {
		order_id: OrderId,
		operation: Operation,
	},

	/// Transition not legal from the order's current status. Deterministic
	/// and side-effect free; the caller may poll and retry.
	#[error("{operation} on order {order_id}: cannot move from {current} to {attempted}")]
	InvalidTransition {
		order_id: OrderId,
		operation: Operation,
		current: OrderStatus,
		attempted: OrderStatus,
	},

	/// Balance could not cover the transfer. The order is unchanged.
	#[error("{operation} on order {order_id}: insufficient funds (need {needed}, have {available})")]
	InsufficientFunds {
		order_id: OrderId,
		operation: Operation,
		needed: Decimal,
		available: Decimal,
	},

	/// No live rate and no cached fallback for the currency pair.
	#[error("create: no rate available for {local_ccy}/{settlement_ccy}")]
	RateUnavailable {
		local_ccy: String,
		settlement_ccy: String,
	},

	#[error("{operation}: order {order_id} not found")]
	OrderNotFound {
		order_id: OrderId,
		operation: Operation,
	},

	/// Mirror write failed; internal only, resolved by retry/self-heal.
	#[error("mirror apply failed for order {order_id}: {reason}")]
	Mirror { order_id: OrderId, reason: String },
}
