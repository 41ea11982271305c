//! Engine orchestration over ledger, rates, fees, and reconciliation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settle_fees::{compute_quote, FeePolicy};
use settle_ledger::{BalanceProvider, CreateOrderParams, OrderLedger, VendorDirectory};
use settle_mirror::{MirrorStore, VendorAccrual};
use settle_rates::{CachingRateSource, RateSource};
use settle_reconciler::{Reconciler, ReconcilerConfig};
use settle_types::{
	Actor, Operation, Order, OrderId, PaymentMode, Result, SettleError,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Engine-level configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub local_ccy: String,
	pub settlement_ccy: String,
	/// Account holding completed-order funds until payout or refund.
	pub escrow_account: String,
	/// Initial platform fee in basis points.
	pub fee_bps: u32,
	pub reconciler: ReconcilerConfig,
}

/// Inputs for `create_order`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
	pub buyer_ref: String,
	pub vendor_ref: String,
	pub amount_local: Decimal,
	pub payment_mode: PaymentMode,
	#[serde(default)]
	pub metadata: Option<String>,
}

/// Where an order read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSource {
	Ledger,
	Mirror,
}

/// A read result tagged with its source and staleness indicator.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
	pub order: Order,
	pub source: ReadSource,
	/// For mirror reads, when the mirror last applied a snapshot; for
	/// ledger reads, now.
	pub as_of: DateTime<Utc>,
}

/// The settlement engine.
pub struct SettlementEngine {
	ledger: Arc<OrderLedger>,
	mirror: Arc<MirrorStore>,
	reconciler: Arc<Reconciler>,
	rates: CachingRateSource,
	fee_policy: FeePolicy,
	config: EngineConfig,
	sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl SettlementEngine {
	/// Create an order in `Pending`.
	///
	/// The only place the rate source and fee policy are consulted; the
	/// resulting economics are frozen onto the order. A rate-feed outage
	/// falls back to the last-known rate with `rate_is_stale` set; it
	/// never blocks creation on its own.
	pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
		if request.amount_local <= Decimal::ZERO {
			return Err(SettleError::Validation {
				operation: Operation::Create,
				reason: format!(
					"amount_local must be positive, got {}",
					request.amount_local
				),
			});
		}

		let resolved = self
			.rates
			.resolve(&self.config.local_ccy, &self.config.settlement_ccy)
			.await
			.map_err(|_| SettleError::RateUnavailable {
				local_ccy: self.config.local_ccy.clone(),
				settlement_ccy: self.config.settlement_ccy.clone(),
			})?;

		let fee_bps = self.fee_policy.fee_bps().await;
		let quote = compute_quote(request.amount_local, resolved.rate, fee_bps);

		let order = self
			.ledger
			.create(CreateOrderParams {
				order_id: OrderId::new(),
				buyer_ref: request.buyer_ref,
				vendor_ref: request.vendor_ref,
				amount_local: request.amount_local,
				fx_rate: resolved.rate,
				rate_is_stale: resolved.is_stale,
				quote,
				payment_mode: request.payment_mode,
				metadata: request.metadata,
			})
			.await?;

		self.reconcile(&order.order_id).await;
		Ok(order)
	}

	/// `Pending -> Completed`, buyer only.
	pub async fn complete_order(&self, order_id: &OrderId, actor: &Actor) -> Result<Order> {
		let order = self.ledger.complete(order_id, actor).await?;
		self.reconcile(order_id).await;
		Ok(order)
	}

	/// `Pending -> Failed`, vendor or admin, with a mandatory reason.
	pub async fn fail_order(
		&self,
		order_id: &OrderId,
		actor: &Actor,
		reason: &str,
	) -> Result<Order> {
		let order = self.ledger.fail(order_id, actor, reason).await?;
		self.reconcile(order_id).await;
		Ok(order)
	}

	/// `Failed -> Pending`, re-opening the same order id for a retry.
	pub async fn reopen_order(&self, order_id: &OrderId, actor: &Actor) -> Result<Order> {
		let order = self.ledger.reopen(order_id, actor).await?;
		self.reconcile(order_id).await;
		Ok(order)
	}

	/// `Completed -> Refunded`, admin only.
	pub async fn refund_order(&self, order_id: &OrderId, actor: &Actor) -> Result<Order> {
		let order = self.ledger.refund(order_id, actor).await?;
		self.reconcile(order_id).await;
		Ok(order)
	}

	/// Read one order, mirror first for low latency, falling back to the
	/// authoritative ledger when the mirror has not caught up yet.
	pub async fn get_order(&self, order_id: &OrderId) -> Result<OrderView> {
		if let Some(record) = self.mirror.get(order_id) {
			return Ok(OrderView {
				order: record.order,
				source: ReadSource::Mirror,
				as_of: record.as_of,
			});
		}

		let order = self.ledger.get(order_id).await?;
		Ok(OrderView {
			order,
			source: ReadSource::Ledger,
			as_of: Utc::now(),
		})
	}

	/// Denormalized vendor totals, served from the mirror.
	pub fn vendor_accrual(&self, vendor_ref: &str) -> VendorAccrual {
		self.mirror.accrual(vendor_ref)
	}

	/// A buyer's orders, served from the mirror's secondary index.
	pub fn orders_for_buyer(&self, buyer_ref: &str) -> Vec<Order> {
		self.collect_mirror_orders(self.mirror.orders_for_buyer(buyer_ref))
	}

	/// A vendor's orders, served from the mirror's secondary index.
	pub fn orders_for_vendor(&self, vendor_ref: &str) -> Vec<Order> {
		self.collect_mirror_orders(self.mirror.orders_for_vendor(vendor_ref))
	}

	fn collect_mirror_orders(&self, ids: Vec<OrderId>) -> Vec<Order> {
		let mut orders: Vec<Order> = ids
			.into_iter()
			.filter_map(|id| self.mirror.get(&id).map(|r| r.order))
			.collect();
		orders.sort_by_key(|o| o.created_at);
		orders
	}

	pub async fn fee_bps(&self) -> u32 {
		self.fee_policy.fee_bps().await
	}

	/// Update the platform fee. Values above 1000 bps are rejected.
	pub async fn set_fee_bps(&self, fee_bps: u32) -> Result<()> {
		self.fee_policy.set_fee_bps(fee_bps).await
	}

	/// Start background work (the consistency sweep).
	pub async fn start(&self) {
		let mut task = self.sweep_task.lock().await;
		if task.is_none() {
			*task = Some(self.reconciler.clone().start_sweep_task());
			info!("Settlement engine started");
		}
	}

	pub async fn shutdown(&self) {
		if let Some(task) = self.sweep_task.lock().await.take() {
			task.abort();
			info!("Settlement engine stopped");
		}
	}

	/// Push the latest accepted transition into the mirror. Mirror lag is
	/// internal: the apply retries with backoff, and anything it cannot
	/// converge is picked up by the sweep, so operations never fail here.
	async fn reconcile(&self, order_id: &OrderId) {
		if let Err(e) = self.reconciler.apply(order_id).await {
			warn!(
				"Mirror apply for order {} did not converge, sweep will heal: {}",
				order_id, e
			);
		}
	}
}

/// Builder wiring the engine's collaborators together.
pub struct SettlementEngineBuilder {
	config: EngineConfig,
	rate_source: Option<Arc<dyn RateSource>>,
	balances: Option<Arc<dyn BalanceProvider>>,
	directory: Option<Arc<dyn VendorDirectory>>,
}

impl SettlementEngineBuilder {
	pub fn new(config: EngineConfig) -> Self {
		Self {
			config,
			rate_source: None,
			balances: None,
			directory: None,
		}
	}

	pub fn with_rate_source(mut self, rate_source: Arc<dyn RateSource>) -> Self {
		self.rate_source = Some(rate_source);
		self
	}

	pub fn with_balances(mut self, balances: Arc<dyn BalanceProvider>) -> Self {
		self.balances = Some(balances);
		self
	}

	pub fn with_directory(mut self, directory: Arc<dyn VendorDirectory>) -> Self {
		self.directory = Some(directory);
		self
	}

	pub fn build(self) -> Result<SettlementEngine> {
		let missing = |what: &str| SettleError::Validation {
			operation: Operation::Create,
			reason: format!("engine builder missing {}", what),
		};

		let rate_source = self.rate_source.ok_or_else(|| missing("rate source"))?;
		let balances = self.balances.ok_or_else(|| missing("balance provider"))?;
		let directory = self.directory.ok_or_else(|| missing("vendor directory"))?;

		let fee_policy = FeePolicy::new(self.config.fee_bps)?;
		let ledger = Arc::new(OrderLedger::new(
			balances,
			directory,
			self.config.escrow_account.clone(),
		));
		let mirror = Arc::new(MirrorStore::new());
		let reconciler = Arc::new(Reconciler::new(
			ledger.clone(),
			mirror.clone(),
			self.config.reconciler.clone(),
		));

		Ok(SettlementEngine {
			ledger,
			mirror,
			reconciler,
			rates: CachingRateSource::new(rate_source),
			fee_policy,
			config: self.config,
			sweep_task: Mutex::new(None),
		})
	}
}
