//! Order data model.
//!
//! An order records a buyer's intent to pay a vendor a local-currency
//! amount, settled in stablecoin. Its economics (FX rate, fee split) are
//! frozen at creation time and never change for the life of the order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an order.
///
/// Generated once at creation and shared verbatim between the authoritative
/// ledger record and its mirror record; it is the identity key the
/// reconciler matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for OrderId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// How the buyer initiated the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMode {
	/// Immediate payment, no attached document.
	DirectPay,
	/// Payment against an invoice; requires non-empty metadata.
	InvoicePay,
}

/// Lifecycle status of an order.
///
/// The only legal sequences are prefixes of
/// `Pending -> Completed -> Refunded` and `Pending -> Failed -> Pending -> ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	Pending,
	Completed,
	Failed,
	Refunded,
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Completed => "completed",
			OrderStatus::Failed => "failed",
			OrderStatus::Refunded => "refunded",
		};
		f.write_str(s)
	}
}

/// A payment order.
///
/// Monetary fields are settlement-currency decimals at 6dp precision except
/// `amount_local`, which is in the buyer's local currency. The invariant
/// `platform_fee + vendor_amount == amount_settlement` holds exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	pub order_id: OrderId,
	/// Opaque identifier of the paying party.
	pub buyer_ref: String,
	/// Opaque identifier of the receiving party.
	pub vendor_ref: String,
	/// Local-currency amount the buyer requested. Always positive.
	pub amount_local: Decimal,
	/// Settlement-currency amount, `amount_local * fx_rate` at 6dp.
	pub amount_settlement: Decimal,
	/// FX rate snapshot captured at creation. Immutable thereafter.
	pub fx_rate: Decimal,
	/// True when the rate source was down at creation and the last-known
	/// rate was used instead.
	pub rate_is_stale: bool,
	pub platform_fee: Decimal,
	pub vendor_amount: Decimal,
	pub payment_mode: PaymentMode,
	/// Free-form metadata; required non-empty for `InvoicePay`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<String>,
	pub status: OrderStatus,
	/// Receipt reference, populated when the order completes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ledger_proof: Option<String>,
	/// Monotonic transition counter; incremented on every accepted
	/// transition. The mirror uses it as an apply watermark.
	pub version: u64,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refunded_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_sequences_display() {
		assert_eq!(OrderStatus::Pending.to_string(), "pending");
		assert_eq!(OrderStatus::Refunded.to_string(), "refunded");
	}

	#[test]
	fn order_id_roundtrips_through_json() {
		let id = OrderId::new();
		let json = serde_json::to_string(&id).unwrap();
		let back: OrderId = serde_json::from_str(&json).unwrap();
		assert_eq!(id, back);
	}
}
