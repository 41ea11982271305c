//! Order ledger state machine.
//!
//! The only legal transitions are:
//!
//! - `Pending -> Completed` (buyer, balance-checked)
//! - `Pending -> Failed` (vendor or admin, with reason)
//! - `Failed -> Pending` (re-open for retry, same order id)
//! - `Completed -> Refunded` (admin, escrow-balance-checked)
//!
//! Authorization is checked before transition validity, so an unauthorized
//! caller never learns the order's current status from the error. Rejected
//! transitions mutate nothing. Transitions on the same order are serialized
//! by a per-order lock; orders never contend with each other.

use crate::{
	balances::{BalanceProvider, TransferError},
	directory::VendorDirectory,
	proof,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use settle_fees::Quote;
use settle_types::{
	Actor, Operation, Order, OrderId, OrderStatus, PaymentMode, Result, Role, SettleError,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Inputs for minting a new order record.
///
/// The engine has already consulted the rate source and fee policy; the
/// ledger freezes the results onto the record.
#[derive(Debug, Clone)]
pub struct CreateOrderParams {
	pub order_id: OrderId,
	pub buyer_ref: String,
	pub vendor_ref: String,
	pub amount_local: Decimal,
	pub fx_rate: Decimal,
	pub rate_is_stale: bool,
	pub quote: Quote,
	pub payment_mode: PaymentMode,
	pub metadata: Option<String>,
}

/// One accepted transition, as recorded in the append-only audit log.
#[derive(Debug, Clone)]
pub struct LedgerEvent {
	pub order_id: OrderId,
	pub operation: Operation,
	pub from: Option<OrderStatus>,
	pub to: OrderStatus,
	pub version: u64,
	pub at: DateTime<Utc>,
}

/// The authoritative order ledger.
pub struct OrderLedger {
	orders: DashMap<OrderId, Arc<Mutex<Order>>>,
	events: Mutex<Vec<LedgerEvent>>,
	balances: Arc<dyn BalanceProvider>,
	directory: Arc<dyn VendorDirectory>,
	/// Account holding completed-order funds until payout or refund.
	escrow_account: String,
}

impl OrderLedger {
	pub fn new(
		balances: Arc<dyn BalanceProvider>,
		directory: Arc<dyn VendorDirectory>,
		escrow_account: impl Into<String>,
	) -> Self {
		Self {
			orders: DashMap::new(),
			events: Mutex::new(Vec::new()),
			balances,
			directory,
			escrow_account: escrow_account.into(),
		}
	}

	/// Create a new order in `Pending`.
	pub async fn create(&self, params: CreateOrderParams) -> Result<Order> {
		if params.amount_local <= Decimal::ZERO {
			return Err(SettleError::Validation {
				operation: Operation::Create,
				reason: format!("amount_local must be positive, got {}", params.amount_local),
			});
		}

		if params.payment_mode == PaymentMode::InvoicePay
			&& params
				.metadata
				.as_deref()
				.map(|m| m.trim().is_empty())
				.unwrap_or(true)
		{
			return Err(SettleError::Validation {
				operation: Operation::Create,
				reason: "invoice payments require non-empty metadata".to_string(),
			});
		}

		if !self.directory.is_vendor_active(&params.vendor_ref).await {
			return Err(SettleError::Validation {
				operation: Operation::Create,
				reason: format!("vendor {} is not active", params.vendor_ref),
			});
		}

		let now = Utc::now();
		let order = Order {
			order_id: params.order_id,
			buyer_ref: params.buyer_ref,
			vendor_ref: params.vendor_ref,
			amount_local: params.amount_local,
			amount_settlement: params.quote.amount_settlement,
			fx_rate: params.fx_rate,
			rate_is_stale: params.rate_is_stale,
			platform_fee: params.quote.platform_fee,
			vendor_amount: params.quote.vendor_amount,
			payment_mode: params.payment_mode,
			metadata: params.metadata,
			status: OrderStatus::Pending,
			ledger_proof: None,
			version: 1,
			created_at: now,
			completed_at: None,
			refunded_at: None,
			failure_reason: None,
		};

		self.orders
			.insert(order.order_id, Arc::new(Mutex::new(order.clone())));
		self.record_event(&order, Operation::Create, None).await;

		info!(
			"Created order {} for buyer {} -> vendor {} ({} settlement)",
			order.order_id, order.buyer_ref, order.vendor_ref, order.amount_settlement
		);
		Ok(order)
	}

	/// `Pending -> Completed`. Buyer only; the buyer's balance must cover
	/// `amount_settlement`, checked and moved inside the same locked
	/// transition.
	pub async fn complete(&self, order_id: &OrderId, actor: &Actor) -> Result<Order> {
		let row = self.row(order_id, Operation::Complete)?;
		let mut order = row.lock().await;

		Self::authorize(&order, actor, Operation::Complete)?;
		Self::ensure_status(
			&order,
			OrderStatus::Pending,
			OrderStatus::Completed,
			Operation::Complete,
		)?;

		self.balances
			.transfer(&order.buyer_ref, &self.escrow_account, order.amount_settlement)
			.await
			.map_err(|TransferError::InsufficientFunds { needed, available }| {
				SettleError::InsufficientFunds {
					order_id: *order_id,
					operation: Operation::Complete,
					needed,
					available,
				}
			})?;

		let now = Utc::now();
		order.status = OrderStatus::Completed;
		order.completed_at = Some(now);
		order.ledger_proof = Some(proof::mint_proof(
			order_id,
			&order.buyer_ref,
			order.amount_settlement,
			now,
		));
		order.version += 1;
		self.record_event(&order, Operation::Complete, Some(OrderStatus::Pending))
			.await;

		info!("Completed order {} (version {})", order_id, order.version);
		Ok(order.clone())
	}

	/// `Pending -> Failed`. Vendor or admin, never the buyer; the reason is
	/// mandatory.
	pub async fn fail(&self, order_id: &OrderId, actor: &Actor, reason: &str) -> Result<Order> {
		let row = self.row(order_id, Operation::Fail)?;
		let mut order = row.lock().await;

		Self::authorize(&order, actor, Operation::Fail)?;

		if reason.trim().is_empty() {
			return Err(SettleError::Validation {
				operation: Operation::Fail,
				reason: "a non-empty failure reason is required".to_string(),
			});
		}

		Self::ensure_status(
			&order,
			OrderStatus::Pending,
			OrderStatus::Failed,
			Operation::Fail,
		)?;

		order.status = OrderStatus::Failed;
		order.failure_reason = Some(reason.to_string());
		order.version += 1;
		self.record_event(&order, Operation::Fail, Some(OrderStatus::Pending))
			.await;

		info!("Failed order {}: {}", order_id, reason);
		Ok(order.clone())
	}

	/// `Failed -> Pending`. Re-opens the same order id for a retried
	/// payment attempt. No balance check here; the next Complete attempt
	/// checks again.
	pub async fn reopen(&self, order_id: &OrderId, actor: &Actor) -> Result<Order> {
		let row = self.row(order_id, Operation::Reopen)?;
		let mut order = row.lock().await;

		Self::authorize(&order, actor, Operation::Reopen)?;
		Self::ensure_status(
			&order,
			OrderStatus::Failed,
			OrderStatus::Pending,
			Operation::Reopen,
		)?;

		order.status = OrderStatus::Pending;
		order.failure_reason = None;
		order.version += 1;
		self.record_event(&order, Operation::Reopen, Some(OrderStatus::Failed))
			.await;

		info!("Reopened order {} for retry", order_id);
		Ok(order.clone())
	}

	/// `Completed -> Refunded`. Admin only; the escrow account must be able
	/// to return the full `amount_settlement` to the buyer.
	pub async fn refund(&self, order_id: &OrderId, actor: &Actor) -> Result<Order> {
		let row = self.row(order_id, Operation::Refund)?;
		let mut order = row.lock().await;

		Self::authorize(&order, actor, Operation::Refund)?;
		Self::ensure_status(
			&order,
			OrderStatus::Completed,
			OrderStatus::Refunded,
			Operation::Refund,
		)?;

		self.balances
			.transfer(&self.escrow_account, &order.buyer_ref, order.amount_settlement)
			.await
			.map_err(|TransferError::InsufficientFunds { needed, available }| {
				SettleError::InsufficientFunds {
					order_id: *order_id,
					operation: Operation::Refund,
					needed,
					available,
				}
			})?;

		order.status = OrderStatus::Refunded;
		order.refunded_at = Some(Utc::now());
		order.version += 1;
		self.record_event(&order, Operation::Refund, Some(OrderStatus::Completed))
			.await;

		info!("Refunded order {} to buyer {}", order_id, order.buyer_ref);
		Ok(order.clone())
	}

	/// Authoritative snapshot of a single order.
	pub async fn get(&self, order_id: &OrderId) -> Result<Order> {
		let row = self.row(order_id, Operation::Query)?;
		let order = row.lock().await;
		Ok(order.clone())
	}

	/// Ids of every order the ledger holds. Used by the consistency sweep.
	pub fn order_ids(&self) -> Vec<OrderId> {
		self.orders.iter().map(|entry| *entry.key()).collect()
	}

	/// Audit trail for one order, in acceptance order.
	pub async fn events_for(&self, order_id: &OrderId) -> Vec<LedgerEvent> {
		self.events
			.lock()
			.await
			.iter()
			.filter(|e| e.order_id == *order_id)
			.cloned()
			.collect()
	}

	fn row(&self, order_id: &OrderId, operation: Operation) -> Result<Arc<Mutex<Order>>> {
		self.orders
			.get(order_id)
			.map(|entry| entry.clone())
			.ok_or(SettleError::OrderNotFound {
				order_id: *order_id,
				operation,
			})
	}

	fn authorize(order: &Order, actor: &Actor, operation: Operation) -> Result<()> {
		let permitted = match operation {
			Operation::Complete => {
				actor.role == Role::Buyer && actor.actor_ref == order.buyer_ref
			}
			Operation::Fail => {
				actor.role == Role::Admin
					|| (actor.role == Role::Vendor && actor.actor_ref == order.vendor_ref)
			}
			Operation::Reopen => {
				actor.role == Role::Admin
					|| (actor.role == Role::Buyer && actor.actor_ref == order.buyer_ref)
			}
			Operation::Refund => actor.role == Role::Admin,
			_ => false,
		};

		if permitted {
			Ok(())
		} else {
			debug!(
				"Denied {} on order {} for {} {}",
				operation, order.order_id, actor.role, actor.actor_ref
			);
			Err(SettleError::Permission {
				order_id: order.order_id,
				operation,
			})
		}
	}

	fn ensure_status(
		order: &Order,
		expected: OrderStatus,
		attempted: OrderStatus,
		operation: Operation,
	) -> Result<()> {
		if order.status == expected {
			Ok(())
		} else {
			Err(SettleError::InvalidTransition {
				order_id: order.order_id,
				operation,
				current: order.status,
				attempted,
			})
		}
	}

	async fn record_event(&self, order: &Order, operation: Operation, from: Option<OrderStatus>) {
		self.events.lock().await.push(LedgerEvent {
			order_id: order.order_id,
			operation,
			from,
			to: order.status,
			version: order.version,
			at: Utc::now(),
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::balances::InMemoryBalances;
	use crate::directory::StaticVendorDirectory;
	use rust_decimal_macros::dec;
	use settle_fees::compute_quote;

	const ESCROW: &str = "escrow";

	fn params(order_id: OrderId) -> CreateOrderParams {
		CreateOrderParams {
			order_id,
			buyer_ref: "buyer-1".to_string(),
			vendor_ref: "vendor-1".to_string(),
			amount_local: dec!(100),
			fx_rate: dec!(0.0611),
			rate_is_stale: false,
			quote: compute_quote(dec!(100), dec!(0.0611), 25),
			payment_mode: PaymentMode::DirectPay,
			metadata: None,
		}
	}

	async fn ledger_with_funds(buyer_funds: Decimal) -> (OrderLedger, Arc<InMemoryBalances>) {
		let balances = Arc::new(InMemoryBalances::new());
		balances.deposit("buyer-1", buyer_funds).await;
		let directory = Arc::new(StaticVendorDirectory::new().with_active("vendor-1"));
		let ledger = OrderLedger::new(balances.clone(), directory, ESCROW);
		(ledger, balances)
	}

	#[tokio::test]
	async fn create_rejects_bad_input_before_touching_state() {
		let (ledger, _) = ledger_with_funds(dec!(0)).await;

		let mut p = params(OrderId::new());
		p.amount_local = dec!(0);
		assert!(matches!(
			ledger.create(p).await,
			Err(SettleError::Validation { .. })
		));

		let mut p = params(OrderId::new());
		p.payment_mode = PaymentMode::InvoicePay;
		p.metadata = Some("  ".to_string());
		assert!(matches!(
			ledger.create(p).await,
			Err(SettleError::Validation { .. })
		));

		let mut p = params(OrderId::new());
		p.vendor_ref = "vendor-unknown".to_string();
		assert!(matches!(
			ledger.create(p).await,
			Err(SettleError::Validation { .. })
		));

		assert!(ledger.order_ids().is_empty());
	}

	#[tokio::test]
	async fn complete_moves_funds_and_mints_proof() {
		let (ledger, balances) = ledger_with_funds(dec!(10)).await;
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();

		let order = ledger
			.complete(&id, &Actor::buyer("buyer-1"))
			.await
			.unwrap();

		assert_eq!(order.status, OrderStatus::Completed);
		assert!(order.ledger_proof.is_some());
		assert!(order.completed_at.is_some());
		assert_eq!(order.version, 2);
		assert_eq!(balances.balance("buyer-1").await, dec!(10) - dec!(6.110000));
		assert_eq!(balances.balance(ESCROW).await, dec!(6.110000));
	}

	#[tokio::test]
	async fn authorization_is_checked_before_transition_validity() {
		let (ledger, _) = ledger_with_funds(dec!(10)).await;
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();
		ledger
			.complete(&id, &Actor::buyer("buyer-1"))
			.await
			.unwrap();

		// A vendor completing an already-completed order gets a permission
		// error, not a transition error that would leak state.
		let err = ledger
			.complete(&id, &Actor::vendor("vendor-1"))
			.await
			.unwrap_err();
		assert!(matches!(err, SettleError::Permission { .. }));

		// The buyer trying to fail their own order is also denied.
		let err = ledger
			.fail(&id, &Actor::buyer("buyer-1"), "changed my mind")
			.await
			.unwrap_err();
		assert!(matches!(err, SettleError::Permission { .. }));
	}

	#[tokio::test]
	async fn insufficient_funds_leaves_order_pending() {
		let (ledger, balances) = ledger_with_funds(dec!(1)).await;
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();

		let err = ledger
			.complete(&id, &Actor::buyer("buyer-1"))
			.await
			.unwrap_err();
		assert!(matches!(err, SettleError::InsufficientFunds { .. }));

		let order = ledger.get(&id).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.version, 1);
		assert_eq!(balances.balance("buyer-1").await, dec!(1));
	}

	#[tokio::test]
	async fn fail_requires_reason_and_reopen_allows_retry() {
		let (ledger, _) = ledger_with_funds(dec!(10)).await;
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();

		let err = ledger
			.fail(&id, &Actor::vendor("vendor-1"), "   ")
			.await
			.unwrap_err();
		assert!(matches!(err, SettleError::Validation { .. }));

		let order = ledger
			.fail(&id, &Actor::vendor("vendor-1"), "customer cancelled")
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Failed);
		assert_eq!(order.failure_reason.as_deref(), Some("customer cancelled"));

		// Same order id comes back to Pending; no new id is minted.
		let order = ledger.reopen(&id, &Actor::buyer("buyer-1")).await.unwrap();
		assert_eq!(order.order_id, id);
		assert_eq!(order.status, OrderStatus::Pending);
		assert!(order.failure_reason.is_none());

		let order = ledger
			.complete(&id, &Actor::buyer("buyer-1"))
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Completed);
	}

	#[tokio::test]
	async fn refund_is_admin_only_and_escrow_checked() {
		let (ledger, balances) = ledger_with_funds(dec!(10)).await;
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();
		ledger
			.complete(&id, &Actor::buyer("buyer-1"))
			.await
			.unwrap();

		let err = ledger
			.refund(&id, &Actor::buyer("buyer-1"))
			.await
			.unwrap_err();
		assert!(matches!(err, SettleError::Permission { .. }));

		let order = ledger.refund(&id, &Actor::admin("ops")).await.unwrap();
		assert_eq!(order.status, OrderStatus::Refunded);
		assert!(order.refunded_at.is_some());
		assert_eq!(balances.balance("buyer-1").await, dec!(10));
		assert_eq!(balances.balance(ESCROW).await, dec!(0));
	}

	#[tokio::test]
	async fn rejected_transitions_are_deterministic_and_side_effect_free() {
		let (ledger, _) = ledger_with_funds(dec!(10)).await;
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();

		// Pending -> Refunded is never legal.
		for _ in 0..3 {
			let err = ledger.refund(&id, &Actor::admin("ops")).await.unwrap_err();
			match err {
				SettleError::InvalidTransition {
					current, attempted, ..
				} => {
					assert_eq!(current, OrderStatus::Pending);
					assert_eq!(attempted, OrderStatus::Refunded);
				}
				other => panic!("unexpected error: {other}"),
			}
		}

		let order = ledger.get(&id).await.unwrap();
		assert_eq!(order.version, 1);
		assert_eq!(ledger.events_for(&id).await.len(), 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
	async fn concurrent_completes_admit_exactly_one_winner() {
		let (ledger, _) = ledger_with_funds(dec!(1000)).await;
		let ledger = Arc::new(ledger);
		let id = OrderId::new();
		ledger.create(params(id)).await.unwrap();

		let mut handles = Vec::new();
		for _ in 0..100 {
			let ledger = ledger.clone();
			handles.push(tokio::spawn(async move {
				ledger.complete(&id, &Actor::buyer("buyer-1")).await
			}));
		}

		let mut won = 0;
		let mut invalid = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(_) => won += 1,
				Err(SettleError::InvalidTransition { .. }) => invalid += 1,
				Err(other) => panic!("unexpected error: {other}"),
			}
		}

		assert_eq!(won, 1);
		assert_eq!(invalid, 99);
	}
}
