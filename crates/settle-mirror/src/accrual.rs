//! Vendor accrual aggregate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running totals a vendor has earned across completed orders.
///
/// Incremented exactly once per completion and decremented only by the
/// refund-reversal rule; both sides are driven by the reconciler's
/// exactly-once flags on the mirror record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAccrual {
	pub total_completed_orders: u64,
	pub total_vendor_amount: Decimal,
}
