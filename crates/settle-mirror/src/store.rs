//! Mirror store: records, secondary indexes, accrual counters.

use crate::accrual::VendorAccrual;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use settle_types::{Order, OrderId, OrderStatus};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MirrorError {
	#[error("mirror write rejected: {0}")]
	Write(String),
}

/// A mirrored order plus replication bookkeeping.
#[derive(Debug, Clone)]
pub struct MirrorRecord {
	pub order: Order,
	/// Highest ledger version applied to this record. Snapshots at or
	/// below this watermark are no-ops, which is what makes the apply
	/// step idempotent.
	pub applied_version: u64,
	/// Set when this order's completion was counted into the vendor
	/// accrual. Guards against double-counting on re-apply.
	pub accrual_applied: bool,
	/// Set when the refund-reversal was applied to the accrual.
	pub accrual_reversed: bool,
	/// When the mirror last applied a snapshot for this order.
	pub as_of: DateTime<Utc>,
}

/// In-memory mirror store with secondary indexes by buyer, vendor, and
/// status, and vendor accrual aggregates.
pub struct MirrorStore {
	records: DashMap<OrderId, MirrorRecord>,
	by_buyer: DashMap<String, HashSet<OrderId>>,
	by_vendor: DashMap<String, HashSet<OrderId>>,
	by_status: DashMap<OrderStatus, HashSet<OrderId>>,
	accruals: DashMap<String, VendorAccrual>,
	/// Pending injected write failures, for exercising the reconciler's
	/// retry path.
	fail_writes: AtomicU32,
}

impl MirrorStore {
	pub fn new() -> Self {
		Self {
			records: DashMap::new(),
			by_buyer: DashMap::new(),
			by_vendor: DashMap::new(),
			by_status: DashMap::new(),
			accruals: DashMap::new(),
			fail_writes: AtomicU32::new(0),
		}
	}

	/// Make the next `n` writes fail.
	pub fn inject_write_failures(&self, n: u32) {
		self.fail_writes.store(n, Ordering::SeqCst);
	}

	/// Insert or replace a mirror record, maintaining the indexes.
	pub fn put(&self, record: MirrorRecord) -> Result<(), MirrorError> {
		if self
			.fail_writes
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
		{
			return Err(MirrorError::Write("injected failure".to_string()));
		}

		let order_id = record.order.order_id;
		let previous_status = self.records.get(&order_id).map(|r| r.order.status);

		if let Some(prev) = previous_status {
			if prev != record.order.status {
				if let Some(mut set) = self.by_status.get_mut(&prev) {
					set.remove(&order_id);
				}
			}
		}

		self.by_buyer
			.entry(record.order.buyer_ref.clone())
			.or_default()
			.insert(order_id);
		self.by_vendor
			.entry(record.order.vendor_ref.clone())
			.or_default()
			.insert(order_id);
		self.by_status
			.entry(record.order.status)
			.or_default()
			.insert(order_id);

		self.records.insert(order_id, record);
		Ok(())
	}

	pub fn get(&self, order_id: &OrderId) -> Option<MirrorRecord> {
		self.records.get(order_id).map(|entry| entry.clone())
	}

	pub fn orders_for_buyer(&self, buyer_ref: &str) -> Vec<OrderId> {
		self.by_buyer
			.get(buyer_ref)
			.map(|set| set.iter().copied().collect())
			.unwrap_or_default()
	}

	pub fn orders_for_vendor(&self, vendor_ref: &str) -> Vec<OrderId> {
		self.by_vendor
			.get(vendor_ref)
			.map(|set| set.iter().copied().collect())
			.unwrap_or_default()
	}

	pub fn orders_with_status(&self, status: OrderStatus) -> Vec<OrderId> {
		self.by_status
			.get(&status)
			.map(|set| set.iter().copied().collect())
			.unwrap_or_default()
	}

	pub fn accrual(&self, vendor_ref: &str) -> VendorAccrual {
		self.accruals
			.get(vendor_ref)
			.map(|entry| entry.clone())
			.unwrap_or_default()
	}

	/// Count a completed order into the vendor's accrual.
	pub fn add_accrual(&self, vendor_ref: &str, vendor_amount: Decimal) {
		let mut accrual = self.accruals.entry(vendor_ref.to_string()).or_default();
		accrual.total_completed_orders += 1;
		accrual.total_vendor_amount += vendor_amount;
	}

	/// Refund-reversal: subtract a previously accrued completion. The only
	/// path that ever decrements an accrual.
	pub fn reverse_accrual(&self, vendor_ref: &str, vendor_amount: Decimal) {
		let mut accrual = self.accruals.entry(vendor_ref.to_string()).or_default();
		accrual.total_completed_orders = accrual.total_completed_orders.saturating_sub(1);
		accrual.total_vendor_amount -= vendor_amount;
		info!(
			"Reversed accrual of {} for vendor {} (refund)",
			vendor_amount, vendor_ref
		);
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}

impl Default for MirrorStore {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;
	use settle_types::PaymentMode;

	fn record(status: OrderStatus, version: u64) -> MirrorRecord {
		let order = Order {
			order_id: OrderId::new(),
			buyer_ref: "buyer-1".to_string(),
			vendor_ref: "vendor-1".to_string(),
			amount_local: dec!(100),
			amount_settlement: dec!(6.110000),
			fx_rate: dec!(0.0611),
			rate_is_stale: false,
			platform_fee: dec!(0.015275),
			vendor_amount: dec!(6.094725),
			payment_mode: PaymentMode::DirectPay,
			metadata: None,
			status,
			ledger_proof: None,
			version,
			created_at: Utc::now(),
			completed_at: None,
			refunded_at: None,
			failure_reason: None,
		};
		MirrorRecord {
			order,
			applied_version: version,
			accrual_applied: false,
			accrual_reversed: false,
			as_of: Utc::now(),
		}
	}

	#[test]
	fn indexes_track_status_changes() {
		let store = MirrorStore::new();
		let mut rec = record(OrderStatus::Pending, 1);
		let id = rec.order.order_id;
		store.put(rec.clone()).unwrap();

		assert_eq!(store.orders_with_status(OrderStatus::Pending), vec![id]);
		assert_eq!(store.orders_for_buyer("buyer-1"), vec![id]);
		assert_eq!(store.orders_for_vendor("vendor-1"), vec![id]);

		rec.order.status = OrderStatus::Completed;
		rec.applied_version = 2;
		store.put(rec).unwrap();

		assert!(store.orders_with_status(OrderStatus::Pending).is_empty());
		assert_eq!(store.orders_with_status(OrderStatus::Completed), vec![id]);
	}

	#[test]
	fn injected_failures_reject_exactly_n_writes() {
		let store = MirrorStore::new();
		store.inject_write_failures(2);

		assert!(store.put(record(OrderStatus::Pending, 1)).is_err());
		assert!(store.put(record(OrderStatus::Pending, 1)).is_err());
		assert!(store.put(record(OrderStatus::Pending, 1)).is_ok());
	}

	#[test]
	fn accrual_add_and_reverse_round_trip() {
		let store = MirrorStore::new();
		store.add_accrual("vendor-1", dec!(6.094725));
		store.add_accrual("vendor-1", dec!(1.000000));

		let accrual = store.accrual("vendor-1");
		assert_eq!(accrual.total_completed_orders, 2);
		assert_eq!(accrual.total_vendor_amount, dec!(7.094725));

		store.reverse_accrual("vendor-1", dec!(6.094725));
		let accrual = store.accrual("vendor-1");
		assert_eq!(accrual.total_completed_orders, 1);
		assert_eq!(accrual.total_vendor_amount, dec!(1.000000));
	}
}
